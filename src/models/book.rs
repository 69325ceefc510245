//! Book (inventory) model and related types

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::error::{AppError, AppResult};

use super::loan::LoanDetails;

/// Book model from database
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Book {
    pub id: i32,
    pub title: String,
    pub author: String,
    pub isbn: String,
    pub category: String,
    pub description: String,
    pub total_quantity: i32,
    pub available_quantity: i32,
}

impl Book {
    pub fn is_available(&self) -> bool {
        self.available_quantity > 0
    }

    /// Copies currently out on loan
    pub fn on_loan(&self) -> i32 {
        self.total_quantity - self.available_quantity
    }

    /// Change the number of owned copies, keeping the copies on loan untouched
    pub fn set_total(&mut self, total: i32) -> AppResult<()> {
        if total < 0 {
            return Err(AppError::Validation(
                "Total quantity cannot be negative".to_string(),
            ));
        }
        let on_loan = self.on_loan();
        if total < on_loan {
            return Err(AppError::Conflict(format!(
                "Cannot reduce total to {} while {} copies are on loan",
                total, on_loan
            )));
        }
        self.total_quantity = total;
        self.available_quantity = total - on_loan;
        Ok(())
    }

    /// Apply an admin update in place
    pub fn apply(&mut self, update: &UpdateBook) -> AppResult<()> {
        if let Some(ref title) = update.title {
            self.title = title.clone();
        }
        if let Some(ref author) = update.author {
            self.author = author.clone();
        }
        if let Some(ref isbn) = update.isbn {
            self.isbn = isbn.clone();
        }
        if let Some(ref category) = update.category {
            self.category = category.clone();
        }
        if let Some(ref description) = update.description {
            self.description = description.clone();
        }
        if let Some(total) = update.total_quantity {
            self.set_total(total)?;
        }
        Ok(())
    }
}

/// Book query parameters
#[derive(Debug, Default, Clone, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct BookQuery {
    /// Case-insensitive match on title or author
    pub q: Option<String>,
    /// Case-insensitive match on category
    pub category: Option<String>,
    /// Only books with at least one copy on the shelf
    pub available_only: Option<bool>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

/// Create book request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateBook {
    #[validate(length(min = 1, message = "Title is required"))]
    pub title: String,
    #[validate(length(min = 1, message = "Author is required"))]
    pub author: String,
    #[validate(length(min = 1, message = "ISBN is required"))]
    pub isbn: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub description: String,
    #[validate(range(min = 0, message = "Total quantity cannot be negative"))]
    pub total_quantity: i32,
}

/// Update book request
#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateBook {
    #[validate(length(min = 1, message = "Title cannot be empty"))]
    pub title: Option<String>,
    #[validate(length(min = 1, message = "Author cannot be empty"))]
    pub author: Option<String>,
    pub isbn: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
    #[validate(range(min = 0, message = "Total quantity cannot be negative"))]
    pub total_quantity: Option<i32>,
}

/// Book with availability status and, for admins, its borrow history
#[derive(Debug, Serialize, ToSchema)]
pub struct BookDetails {
    #[serde(flatten)]
    pub book: Book,
    pub current_status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history: Option<Vec<LoanDetails>>,
}
