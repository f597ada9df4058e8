//! Marker types.

/// Marker type describing a moment some data was fetched at.
#[derive(Clone, Copy, Debug)]
pub struct Fetching;

/// Marker type describing an entity expiration.
#[derive(Clone, Copy, Debug)]
pub struct Expiration;
