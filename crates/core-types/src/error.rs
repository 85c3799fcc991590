use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Artifact for {code} is malformed: {reason}")]
    MalformedArtifact { code: String, reason: String },
}
