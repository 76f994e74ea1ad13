use serde::{Deserialize, Serialize};

use crate::{config::RecommendationConfig, products::schemas::Product};

pub const COLLECTIONS_INTERACTIONS: &str = "interactions";

/// Header carrying the client-generated session token for anonymous
/// interaction attribution. An authenticated identity takes precedence.
pub const SESSION_ID_HEADER: &str = "x-session-id";

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    View,
    Cart,
    Wishlist,
    Purchase,
}

impl InteractionKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "view" => Some(Self::View),
            "cart" => Some(Self::Cart),
            "wishlist" => Some(Self::Wishlist),
            "purchase" => Some(Self::Purchase),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::View => "view",
            Self::Cart => "cart",
            Self::Wishlist => "wishlist",
            Self::Purchase => "purchase",
        }
    }

    /// Name of the denormalized counter this interaction bumps on the
    /// product document.
    pub fn counter_field(&self) -> &'static str {
        match self {
            Self::View => "view_count",
            Self::Cart => "cart_add_count",
            Self::Wishlist => "wishlist_count",
            Self::Purchase => "purchase_count",
        }
    }

    pub fn weight(&self, config: &RecommendationConfig) -> i64 {
        match self {
            Self::View => config.view_weight,
            Self::Cart => config.cart_weight,
            Self::Wishlist => config.wishlist_weight,
            Self::Purchase => config.purchase_weight,
        }
    }
}

/// Append-only event record. Exactly one of `user_id` and `session_id` is
/// set; events with neither are rejected at ingestion.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Interaction {
    /// Client-supplied idempotency key when present, server-generated
    /// otherwise. Gives the ingestion path a de-duplication hook.
    pub event_id: String,
    pub product_id: String,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub kind: InteractionKind,
    pub weight: i64,
    pub created_at: u64,
}

#[derive(Debug, Deserialize)]
pub struct TrackRequest {
    pub product_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub event_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BatchTrackRequest {
    pub interactions: Vec<TrackRequest>,
}

#[derive(Debug, Serialize)]
pub struct TrackResult {
    pub product_id: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTagsRequest {
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Content,
    Collaborative,
    Hybrid,
    Popularity,
}

impl Strategy {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "content" => Some(Self::Content),
            "collaborative" => Some(Self::Collaborative),
            "hybrid" => Some(Self::Hybrid),
            "popularity" => Some(Self::Popularity),
            _ => None,
        }
    }

    pub fn wants_content(&self) -> bool {
        matches!(self, Self::Content | Self::Hybrid)
    }

    pub fn wants_collaborative(&self) -> bool {
        matches!(self, Self::Collaborative | Self::Hybrid)
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct RecommendationQuery {
    pub limit: Option<i64>,
    pub strategy: Option<String>,
    #[serde(alias = "excludeIds")]
    pub exclude_ids: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RecommendationResponse {
    pub success: bool,
    pub products: Vec<Product>,
    pub strategy: Strategy,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_tags: Option<Vec<String>>,
}
