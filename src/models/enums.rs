use crate::models::ModelError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern.
///
/// Each variant is pinned to its wire string via `#[serde(rename)]`, so the
/// serde form and `as_str()` always agree — these values travel in backend
/// query parameters and JSON payloads, not just in-process.
macro_rules! wire_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $s)] $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = ModelError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(ModelError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }
    };
}

wire_enum!(FileKind {
    Pdf => "PDF",
    Docx => "DOCX",
    ImageFolder => "IMAGE_FOLDER",
});

wire_enum!(SortKey {
    FileCreationDate => "file_creation_date",
    PatientName => "patient_name",
    IndexedAt => "created_at",
});

wire_enum!(SortDirection {
    Ascending => "asc",
    Descending => "desc",
});

impl FileKind {
    /// File extension used when suggesting a download name.
    pub fn extension(&self) -> String {
        self.as_str().to_lowercase()
    }
}

impl Default for SortKey {
    fn default() -> Self {
        Self::FileCreationDate
    }
}

impl Default for SortDirection {
    fn default() -> Self {
        Self::Descending
    }
}
