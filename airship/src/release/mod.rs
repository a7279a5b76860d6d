//! Release-check call: request/response types, the client seam and
//! normalization of the accepted response shapes.

mod client;
mod normalize;
mod types;

pub use client::{HttpReleaseClient, ReleaseClient};
pub use normalize::normalize_release;
pub use types::{AppliedBundleStatus, NormalizedRelease, ReleaseCheckRequest, ReleaseOffer};

#[cfg(test)]
pub(crate) use client::tests::MockReleaseClient;
