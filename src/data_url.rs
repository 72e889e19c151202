use std::fmt;
use std::str::FromStr;

use base64::Engine;

use crate::error::StudioError;

/// True for `image/<subtype>` where the subtype is a plain token.
pub fn is_image_mime_type(value: &str) -> bool {
    match value.strip_prefix("image/") {
        Some(subtype) => {
            !subtype.is_empty()
                && subtype
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        }
        None => false,
    }
}

/// A `data:<mime>;base64,<payload>` URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUrl {
    mime_type: String,
    data: String,
}

impl DataUrl {
    pub fn new(mime_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data: data.into(),
        }
    }

    pub fn from_bytes(mime_type: impl Into<String>, bytes: &[u8]) -> Self {
        Self::new(
            mime_type,
            base64::engine::general_purpose::STANDARD.encode(bytes),
        )
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// The base64 payload, without the prefix.
    pub fn data(&self) -> &str {
        &self.data
    }

    pub fn decode(&self) -> Result<Vec<u8>, StudioError> {
        base64::engine::general_purpose::STANDARD
            .decode(self.data.as_bytes())
            .map_err(|err| StudioError::InvalidInput(format!("image data is not valid base64: {err}")))
    }
}

impl fmt::Display for DataUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "data:{};base64,{}", self.mime_type, self.data)
    }
}

impl FromStr for DataUrl {
    type Err = StudioError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let invalid = || StudioError::InvalidInput("image must be a base64 data URL".into());
        let rest = raw.trim().strip_prefix("data:").ok_or_else(invalid)?;
        let (header, data) = rest.split_once(',').ok_or_else(invalid)?;
        let mime_type = header.strip_suffix(";base64").ok_or_else(invalid)?;
        if data.is_empty() {
            return Err(invalid());
        }
        if !is_image_mime_type(mime_type) {
            return Err(StudioError::InvalidInput(
                "data URL must carry an image media type".into(),
            ));
        }
        if !data
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '/' | '='))
        {
            return Err(StudioError::InvalidInput(
                "image data is not valid base64".into(),
            ));
        }
        Ok(Self::new(mime_type, data))
    }
}
