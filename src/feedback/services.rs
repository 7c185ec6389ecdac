use time::OffsetDateTime;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::{
    dto::{FeedbackPage, SearchQuery, DEFAULT_PER_PAGE, MAX_PER_PAGE},
    repo::FeedbackStore,
    repo_types::{Category, Feedback, Status, DEFAULT_LOCATION},
};
use crate::{
    error::FeedbackError,
    images::services::{image_ext, store_image, ImageUpload},
    storage::StorageClient,
};

/// Raw submission as collected from the multipart form.
#[derive(Debug, Default)]
pub struct NewFeedback {
    pub category: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub image: Option<ImageUpload>,
}

fn required(field: Option<&str>) -> Option<&str> {
    field.filter(|v| !v.trim().is_empty())
}

pub async fn submit_feedback(
    store: &dyn FeedbackStore,
    uploads: &dyn StorageClient,
    max_image_bytes: usize,
    input: NewFeedback,
) -> Result<Feedback, FeedbackError> {
    let (Some(category), Some(description)) = (
        required(input.category.as_deref()),
        required(input.description.as_deref()),
    ) else {
        return Err(FeedbackError::Validation(
            "Category and description are required".into(),
        ));
    };
    let category = Category::parse(category.trim()).ok_or_else(|| {
        FeedbackError::Validation(format!("Unknown category: {}", category.trim()))
    })?;
    let description = description.to_string();
    let location = required(input.location.as_deref())
        .unwrap_or(DEFAULT_LOCATION)
        .to_string();

    if let Some(img) = &input.image {
        if img.body.len() > max_image_bytes {
            return Err(FeedbackError::PayloadTooLarge { limit: max_image_bytes });
        }
        if image_ext(img).is_none() {
            warn!(file_name = ?img.file_name, content_type = ?img.content_type, "rejected image type");
            return Err(FeedbackError::Validation(
                "Image must be a JPEG, PNG, GIF, WebP or HEIC file".into(),
            ));
        }
    }

    let stored = match input.image {
        Some(img) => Some(store_image(uploads, img).await?),
        None => None,
    };

    let feedback = Feedback {
        id: Uuid::new_v4(),
        category,
        description,
        location,
        image: stored.as_ref().map(|s| s.public_path.clone()),
        status: Status::Pending,
        date: OffsetDateTime::now_utc(),
    };

    if let Err(e) = store.insert(&feedback).await {
        if let Some(s) = &stored {
            if let Err(cleanup) = uploads.delete_object(&s.key).await {
                warn!(error = %cleanup, key = %s.key, "orphaned upload left behind");
            }
        }
        return Err(FeedbackError::Storage(e));
    }

    info!(
        feedback_id = %feedback.id,
        category = feedback.category.as_str(),
        has_image = feedback.image.is_some(),
        "feedback submitted"
    );
    Ok(feedback)
}

/// Every stored record in storage order.
///
/// A failed read is logged and reported as an empty list so the listing stays
/// available; callers cannot tell an unreadable store from an empty one.
pub async fn list_feedback(store: &dyn FeedbackStore) -> Vec<Feedback> {
    match store.list().await {
        Ok(items) => items,
        Err(e) => {
            error!(error = %format!("{e:#}"), "feedback read failed; serving empty list");
            Vec::new()
        }
    }
}

/// Status filter, substring match, newest first, then one page.
pub fn search_feedback(items: Vec<Feedback>, q: &SearchQuery) -> Result<FeedbackPage, FeedbackError> {
    let status = match q.status.as_deref().map(str::trim) {
        None | Some("") | Some("All") => None,
        Some(s) => Some(
            Status::parse(s)
                .ok_or_else(|| FeedbackError::Validation(format!("Unknown status: {}", s)))?,
        ),
    };
    let needle = q
        .q
        .as_deref()
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty());
    let per_page = q.per_page.unwrap_or(DEFAULT_PER_PAGE).clamp(1, MAX_PER_PAGE);
    let page = q.page.unwrap_or(1).max(1);

    let mut matched: Vec<Feedback> = items
        .into_iter()
        .filter(|f| status.map_or(true, |s| f.status == s))
        .filter(|f| {
            needle.as_deref().map_or(true, |n| {
                f.category.as_str().to_lowercase().contains(n)
                    || f.description.to_lowercase().contains(n)
            })
        })
        .collect();
    // stable: equal dates keep storage order
    matched.sort_by(|a, b| b.date.cmp(&a.date));

    let total = matched.len();
    let items = matched
        .into_iter()
        .skip((page - 1).saturating_mul(per_page))
        .take(per_page)
        .collect();

    Ok(FeedbackPage {
        items,
        total,
        page,
        per_page,
        pages: total.div_ceil(per_page),
    })
}

pub async fn update_status(
    store: &dyn FeedbackStore,
    id: Uuid,
    status: Status,
) -> Result<Feedback, FeedbackError> {
    let updated = store
        .set_status(id, status)
        .await?
        .ok_or(FeedbackError::NotFound)?;
    info!(feedback_id = %id, status = status.as_str(), "feedback status changed");
    Ok(updated)
}
