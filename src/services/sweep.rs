//! Periodic fine sweep

use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;

use super::loans::LoansService;

/// Spawn the background task billing overdue loans every `interval`
pub fn spawn(loans: LoansService, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if let Err(e) = loans.run_fine_sweep(Utc::now()).await {
                tracing::error!("Fine sweep failed: {}", e);
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use chrono::Duration as ChronoDuration;
    use rust_decimal::Decimal;

    use super::*;
    use crate::{
        models::{
            book::CreateBook,
            fee::FinePolicy,
            user::{NewUser, Role},
        },
        repository::Repository,
    };

    #[tokio::test]
    async fn test_sweep_task_bills_overdue_loans() {
        let repository = Repository::in_memory();
        let user = repository
            .users
            .create(&NewUser {
                fullname: "Late Reader".to_string(),
                username: "late".to_string(),
                email: "late@example.org".to_string(),
                password_hash: "x".to_string(),
                role: Role::Student,
            })
            .await
            .unwrap();
        let book = repository
            .books
            .create(&CreateBook {
                title: "Foundation".to_string(),
                author: "Isaac Asimov".to_string(),
                isbn: "9780553293357".to_string(),
                category: String::new(),
                description: String::new(),
                total_quantity: 1,
            })
            .await
            .unwrap();
        let borrowed = Utc::now() - ChronoDuration::days(17);
        repository
            .loans
            .borrow(user.id, book.id, borrowed, borrowed + ChronoDuration::days(14))
            .await
            .unwrap();

        let handle = spawn(
            LoansService::new(repository.clone(), FinePolicy::default()),
            Duration::from_millis(10),
        );
        // The first tick fires immediately; later ticks bill nothing new
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.abort();

        assert_eq!(repository.fees.total(Some(user.id)).await.unwrap(), Decimal::from(3));
        assert_eq!(repository.fees.list(Some(user.id)).await.unwrap().len(), 1);
    }
}
