pub mod models;
pub mod profile;
pub mod redact;

pub use models::*;
pub use profile::{Profile, ProfileError};
pub use redact::{
    candidate_spans, is_phone_like, redact, redact_counted, redact_optional, CandidateSpan,
    Redaction, RedactionStats, PHONE_PLACEHOLDER,
};
