use thiserror::Error;

#[derive(Error, Debug)]
pub enum CommandError {
    #[error("error executing '{program}'. Output: {output}")]
    ExitError { program: String, output: String },

    #[error("could not start '{program}': {source}")]
    SpawnError {
        program: String,
        #[source]
        source: std::io::Error,
    },
}
