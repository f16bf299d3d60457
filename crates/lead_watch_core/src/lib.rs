//! Lead watch core: snapshot normalization, change detection, notification
//! dedup and the pure poll-cycle state machine.
mod backoff;
mod decode;
mod dedup;
mod diff;
mod effect;
mod msg;
mod normalize;
mod record;
mod settings;
mod state;
mod update;

pub use backoff::{BackoffPolicy, BackoffState};
pub use decode::{decode_text, decode_text_lossy, DecodeError, DecodedText};
pub use dedup::{Deduplicator, NotificationState};
pub use diff::{diff, DiffOutcome};
pub use effect::Effect;
pub use msg::{FailureClass, FetchFailure, Msg};
pub use normalize::{canonical_text, ExtractionRule, Normalizer, NormalizerSettings};
pub use record::{
    bounded_excerpt, IdentitySource, NewRecordBatch, NormalizedSnapshot, RawSnapshot, Record,
    SnapshotMode, RAW_EXCERPT_MAX_CHARS,
};
pub use settings::{NotifyMethod, WatchSettings};
pub use state::{Phase, PollerState, PollerStats};
pub use update::update;
