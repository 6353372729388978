#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid object id: {0}")]
    InvalidObjectId(base64::DecodeError),
    #[error("failed to serialize DIDL-Lite: {0}")]
    Xml(#[from] quick_xml::SeError),
}
