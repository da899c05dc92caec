use serde::{Deserialize, Serialize};

/// Size variant an image is stored and served at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageTier {
    Original,
    Web,
}

impl ImageTier {
    /// Every tier a gallery zip is built for.
    pub const ALL: [ImageTier; 2] = [ImageTier::Original, ImageTier::Web];

    /// Convert from string (case-insensitive)
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "original" => Some(ImageTier::Original),
            "web" => Some(ImageTier::Web),
            _ => None,
        }
    }

    /// Convert to string; also the on-disk directory name of the tier.
    pub fn as_str(self) -> &'static str {
        match self {
            ImageTier::Original => "original",
            ImageTier::Web => "web",
        }
    }
}

impl std::fmt::Display for ImageTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<ImageTier> for String {
    fn from(tier: ImageTier) -> Self {
        tier.as_str().to_string()
    }
}

impl TryFrom<String> for ImageTier {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_str(&value).ok_or_else(|| format!("Invalid image size: {}", value))
    }
}

impl TryFrom<&str> for ImageTier {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::from_str(value).ok_or_else(|| format!("Invalid image size: {}", value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_tiers_case_insensitively() {
        assert_eq!(ImageTier::from_str("WEB"), Some(ImageTier::Web));
        assert_eq!(ImageTier::from_str("original"), Some(ImageTier::Original));
        assert_eq!(ImageTier::try_from("thumb"), Err("Invalid image size: thumb".to_string()));
    }
}
