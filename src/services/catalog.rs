//! Catalog management service

use chrono::Utc;

use crate::{
    error::AppResult,
    models::{
        book::{Book, BookDetails, BookQuery, CreateBook, UpdateBook},
        loan::{LoanDetails, LoanFilter},
    },
    repository::Repository,
};

#[derive(Clone)]
pub struct CatalogService {
    repository: Repository,
}

impl CatalogService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    /// Search books with filters
    pub async fn search_books(&self, query: &BookQuery) -> AppResult<(Vec<Book>, i64)> {
        self.repository.books.search(query).await
    }

    pub async fn categories(&self) -> AppResult<Vec<String>> {
        self.repository.books.categories().await
    }

    /// Get a book with its availability; the borrow history is included on request
    pub async fn get_book(&self, id: i32, with_history: bool) -> AppResult<BookDetails> {
        let book = self.repository.books.get_by_id(id).await?;

        let history = if with_history {
            let now = Utc::now();
            let rows = self
                .repository
                .loans
                .list(LoanFilter {
                    book_id: Some(id),
                    ..Default::default()
                })
                .await?;
            Some(
                rows.into_iter()
                    .map(|row| LoanDetails::from_row(row, now))
                    .collect(),
            )
        } else {
            None
        };

        let current_status = if book.is_available() {
            "Available"
        } else {
            "Not Available"
        };

        Ok(BookDetails {
            book,
            current_status: current_status.to_string(),
            history,
        })
    }

    pub async fn create_book(&self, book: CreateBook) -> AppResult<Book> {
        let created = self.repository.books.create(&book).await?;
        tracing::info!(book_id = created.id, title = %created.title, "Book created");
        Ok(created)
    }

    pub async fn update_book(&self, id: i32, update: UpdateBook) -> AppResult<Book> {
        let updated = self.repository.books.update(id, &update).await?;
        tracing::info!(
            book_id = id,
            total = updated.total_quantity,
            available = updated.available_quantity,
            "Book updated"
        );
        Ok(updated)
    }

    pub async fn delete_book(&self, id: i32) -> AppResult<()> {
        self.repository.books.delete(id).await?;
        tracing::info!(book_id = id, "Book deleted");
        Ok(())
    }
}
