pub mod blocks;
pub mod codec;
pub mod engine;
pub mod error;
pub mod extract;
pub mod index;
pub mod retention;
pub mod state;

pub use blocks::Block;
pub use codec::{decode, decode_blocks, encode, encode_checked, parse_action_value, MAX_BLOCKS};
pub use engine::{QueueEngine, ReconcileOutcome, ShowOutcome, NO_PENDING_TEXT};
pub use error::QueueError;
pub use extract::{find_links, Extractor, Submission};
pub use retention::RetentionPolicy;
pub use state::{header_text, QueueEntry, QueueHandle, QueueItem, QueuePhase, QueueState};
