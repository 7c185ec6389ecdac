use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

pub const DEFAULT_LOCATION: &str = "Not provided";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Category {
    Bug,
    #[serde(rename = "Feature Request")]
    FeatureRequest,
    #[serde(rename = "General Feedback")]
    GeneralFeedback,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Bug => "Bug",
            Category::FeatureRequest => "Feature Request",
            Category::GeneralFeedback => "General Feedback",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Bug" => Some(Category::Bug),
            "Feature Request" => Some(Category::FeatureRequest),
            "General Feedback" => Some(Category::GeneralFeedback),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum Status {
    #[default]
    Pending,
    Resolved,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Pending => "Pending",
            Status::Resolved => "Resolved",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Pending" => Some(Status::Pending),
            "Resolved" => Some(Status::Resolved),
            _ => None,
        }
    }
}

/// One submitted report, as stored and as returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Feedback {
    pub id: Uuid,
    pub category: Category,
    pub description: String,
    pub location: String,
    pub image: Option<String>, // public path, e.g. /uploads/1700000000000-1a2b3c4d.png
    pub status: Status,
    #[serde(with = "time::serde::rfc3339")]
    pub date: OffsetDateTime,
}

/// Row shape of the `feedback` table.
#[derive(Debug, sqlx::FromRow)]
pub struct FeedbackRow {
    pub id: Uuid,
    pub category: String,
    pub description: String,
    pub location: String,
    pub image: Option<String>,
    pub status: String,
    pub created_at: OffsetDateTime,
}

impl TryFrom<FeedbackRow> for Feedback {
    type Error = anyhow::Error;

    fn try_from(r: FeedbackRow) -> Result<Self, Self::Error> {
        let category = Category::parse(&r.category)
            .ok_or_else(|| anyhow::anyhow!("unknown category {:?} on {}", r.category, r.id))?;
        let status = Status::parse(&r.status)
            .ok_or_else(|| anyhow::anyhow!("unknown status {:?} on {}", r.status, r.id))?;
        Ok(Self {
            id: r.id,
            category,
            description: r.description,
            location: r.location,
            image: r.image,
            status,
            date: r.created_at,
        })
    }
}
