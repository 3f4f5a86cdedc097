// RouterOS REST API (RouterOS v7 `/rest` endpoints)
//
// `client` owns transport mechanics and response parsing; `hotspot`
// adds the hotspot user, profile and active-session endpoints as
// inherent methods; `models` holds the wire types.

pub mod client;
pub mod duration;
pub mod hotspot;
pub mod models;

pub use client::RouterOsClient;
pub use duration::parse_duration;
pub use models::{
    ActiveSession, HotspotProfile, HotspotUser, LoginRequest, NewHotspotUser, ProfileSpec,
};
