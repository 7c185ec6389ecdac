use serde::{Deserialize, Serialize};

use super::repo_types::{Feedback, Status};

pub const DEFAULT_PER_PAGE: usize = 5;
pub const MAX_PER_PAGE: usize = 100;

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub message: String,
    pub feedback: Feedback,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: Status,
}

/// Query string of `GET /feedback/search`.
#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    /// `All`, `Pending` or `Resolved`.
    pub status: Option<String>,
    pub q: Option<String>,
    pub page: Option<usize>,
    pub per_page: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct FeedbackPage {
    pub items: Vec<Feedback>,
    pub total: usize,
    pub page: usize,
    pub per_page: usize,
    pub pages: usize,
}
