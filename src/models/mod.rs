/// Declares a string-backed status enum with `as_str`, `FromStr` and `Display`.
macro_rules! string_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(format!("unknown {} value: {}", stringify!($name), other)),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

pub(crate) use string_enum;

mod draft;
mod project;
mod publication;
mod schedule;
mod source;
mod usage;

pub use draft::{DraftStatus, NewDraft, PostDraft};
pub use project::{
    BindingStatus, ChannelBinding, Project, ProjectSettings, ResolvedSettings, SettingsUpdate,
};
pub use publication::{NewPublicationLog, PublicationLog, PublicationStatus};
pub use schedule::{normalize_slots, parse_slot, validate_timezone, Schedule, MAX_SLOTS};
pub use source::{NewSourceItem, Source, SourceItem, SourceItemStatus, SourceStatus, SourceType};
pub use usage::{UsageCounter, UsageDelta};

/// Result of an insert that tolerates a uniqueness conflict by returning the existing row.
#[derive(Debug, Clone, PartialEq)]
pub enum Inserted<T> {
    Created(T),
    Existing(T),
}

impl<T> Inserted<T> {
    pub fn into_inner(self) -> T {
        match self {
            Inserted::Created(v) | Inserted::Existing(v) => v,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, Inserted::Created(_))
    }
}
