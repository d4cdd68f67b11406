use crate::domain::message::{FeedItem, GeoPoint};
use serde::{Deserialize, Serialize};

/// A viewport sample request.
///
/// `nsfw = true` opts in to explicit messages; it defaults to `false`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedRequest {
    pub num_messages: usize,
    #[serde(default)]
    pub nsfw: bool,
    pub nw_coord: GeoPoint,
    pub se_coord: GeoPoint,
}

/// Echoes the viewport so clients can match responses to requests.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedResponse {
    pub messages: Vec<FeedItem>,
    pub nw_coord: GeoPoint,
    pub se_coord: GeoPoint,
}
