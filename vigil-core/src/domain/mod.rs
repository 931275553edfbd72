pub mod block;
pub mod moving_average;
pub mod nonce;
pub mod scheme;
pub mod sign_state;

pub use block::{Block, Hrs, Step};
pub use moving_average::MovingAverage;
pub use nonce::{CachedNonce, Nonce, NonceCache, UuidNonces};
pub use scheme::{NonceShares, PartialSignature, SoftShareScheme, ThresholdScheme};
pub use sign_state::{LastSignedState, SignCheck};
