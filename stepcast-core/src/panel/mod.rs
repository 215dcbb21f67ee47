//! Panel data: raw rows, the validation gate and the normalizer.

pub mod frame;
pub mod gate;
pub mod normalize;

pub use frame::{Panel, PanelRow};
pub use gate::ValidationGate;
pub use normalize::{NormalizedPanel, PanelNormalizer};
