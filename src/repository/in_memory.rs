//! In-memory implementation of every repository trait
//!
//! All state sits behind one mutex, so each operation (borrow, return,
//! sweep) is applied as a whole or not at all, like a database transaction.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;

use crate::{
    error::{AppError, AppResult},
    models::{
        book::{Book, BookQuery, CreateBook, UpdateBook},
        fee::{late_return_reason, overdue_reason, Fee, FeeDetails, FinePolicy, SweepReport},
        loan::{BorrowRecord, LoanCounts, LoanFilter, LoanRow, ReturnOutcome},
        stats::{ActiveUser, PopularBook},
        user::{NewUser, Role, User, UserChanges, UserQuery},
    },
};

use super::{
    books::{BookCounts, BooksRepository, BILLED_HISTORY},
    fees::FeesRepository,
    loans::{LoansRepository, ALREADY_BORROWED, NOT_AVAILABLE, NOT_BORROWED},
    page_bounds,
    users::{UserCounts, UsersRepository},
};

#[derive(Default)]
struct State {
    users: BTreeMap<i32, User>,
    books: BTreeMap<i32, Book>,
    records: BTreeMap<i32, BorrowRecord>,
    fees: BTreeMap<i32, Fee>,
    next_user_id: i32,
    next_book_id: i32,
    next_record_id: i32,
    next_fee_id: i32,
}

fn next_id(counter: &mut i32) -> i32 {
    *counter += 1;
    *counter
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

fn paginate<T>(items: Vec<T>, page: Option<i64>, per_page: Option<i64>) -> Vec<T> {
    let (_, per_page, offset) = page_bounds(page, per_page);
    items
        .into_iter()
        .skip(usize::try_from(offset).unwrap_or(usize::MAX))
        .take(usize::try_from(per_page).unwrap_or(usize::MAX))
        .collect()
}

impl State {
    fn user(&self, id: i32) -> AppResult<&User> {
        self.users
            .get(&id)
            .ok_or_else(|| AppError::NotFound(format!("User with id {} not found", id)))
    }

    fn book(&self, id: i32) -> AppResult<&Book> {
        self.books
            .get(&id)
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))
    }

    fn active_record(&self, user_id: i32, book_id: i32) -> Option<&BorrowRecord> {
        self.records
            .values()
            .find(|r| r.user_id == user_id && r.book_id == book_id && r.is_active())
    }

    fn loan_row(&self, record: &BorrowRecord) -> LoanRow {
        let book = self.books.get(&record.book_id);
        let user = self.users.get(&record.user_id);
        LoanRow {
            record: record.clone(),
            book_title: book.map(|b| b.title.clone()).unwrap_or_default(),
            book_author: book.map(|b| b.author.clone()).unwrap_or_default(),
            user_fullname: user.map(|u| u.fullname.clone()).unwrap_or_default(),
        }
    }

    fn insert_fee(
        &mut self,
        user_id: i32,
        record_id: i32,
        now: DateTime<Utc>,
        amount: Decimal,
        reason: String,
    ) -> Fee {
        let fee = Fee {
            id: next_id(&mut self.next_fee_id),
            user_id,
            borrow_record_id: Some(record_id),
            created_at: now,
            amount,
            reason,
        };
        self.fees.insert(fee.id, fee.clone());
        fee
    }
}

/// Process-memory store
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

#[async_trait]
impl BooksRepository for InMemoryStore {
    async fn get_by_id(&self, id: i32) -> AppResult<Book> {
        self.state.lock().book(id).cloned()
    }

    async fn search(&self, query: &BookQuery) -> AppResult<(Vec<Book>, i64)> {
        let state = self.state.lock();
        let mut books: Vec<Book> = state
            .books
            .values()
            .filter(|b| {
                query
                    .q
                    .as_deref()
                    .map_or(true, |q| contains_ci(&b.title, q) || contains_ci(&b.author, q))
            })
            .filter(|b| {
                query
                    .category
                    .as_deref()
                    .map_or(true, |c| contains_ci(&b.category, c))
            })
            .filter(|b| !query.available_only.unwrap_or(false) || b.is_available())
            .cloned()
            .collect();
        books.sort_by(|a, b| a.title.cmp(&b.title).then(a.id.cmp(&b.id)));

        let total = books.len() as i64;
        Ok((paginate(books, query.page, query.per_page), total))
    }

    async fn categories(&self) -> AppResult<Vec<String>> {
        let state = self.state.lock();
        let categories: BTreeSet<String> = state
            .books
            .values()
            .filter(|b| !b.category.is_empty())
            .map(|b| b.category.clone())
            .collect();
        Ok(categories.into_iter().collect())
    }

    async fn create(&self, book: &CreateBook) -> AppResult<Book> {
        let mut state = self.state.lock();
        let created = Book {
            id: next_id(&mut state.next_book_id),
            title: book.title.clone(),
            author: book.author.clone(),
            isbn: book.isbn.clone(),
            category: book.category.clone(),
            description: book.description.clone(),
            total_quantity: book.total_quantity,
            available_quantity: book.total_quantity,
        };
        state.books.insert(created.id, created.clone());
        Ok(created)
    }

    async fn update(&self, id: i32, update: &UpdateBook) -> AppResult<Book> {
        let mut state = self.state.lock();
        let mut book = state.book(id)?.clone();
        book.apply(update)?;
        state.books.insert(id, book.clone());
        Ok(book)
    }

    async fn delete(&self, id: i32) -> AppResult<()> {
        let mut state = self.state.lock();
        state.book(id)?;
        if state.records.values().any(|r| r.book_id == id && r.is_active()) {
            return Err(AppError::Conflict(
                "Cannot delete book with active borrows".to_string(),
            ));
        }

        let removed: Vec<i32> = state
            .records
            .values()
            .filter(|r| r.book_id == id)
            .map(|r| r.id)
            .collect();
        if state
            .fees
            .values()
            .any(|f| f.borrow_record_id.is_some_and(|r| removed.contains(&r)))
        {
            return Err(AppError::Conflict(BILLED_HISTORY.to_string()));
        }

        for record_id in &removed {
            state.records.remove(record_id);
        }
        state.books.remove(&id);
        Ok(())
    }

    async fn counts(&self) -> AppResult<BookCounts> {
        let state = self.state.lock();
        Ok(BookCounts {
            total: state.books.len() as i64,
            available: state.books.values().filter(|b| b.is_available()).count() as i64,
        })
    }
}

#[async_trait]
impl UsersRepository for InMemoryStore {
    async fn get_by_id(&self, id: i32) -> AppResult<User> {
        self.state.lock().user(id).cloned()
    }

    async fn get_by_username(&self, username: &str) -> AppResult<Option<User>> {
        let state = self.state.lock();
        Ok(state
            .users
            .values()
            .find(|u| u.username.eq_ignore_ascii_case(username))
            .cloned())
    }

    async fn create(&self, user: &NewUser) -> AppResult<User> {
        let mut state = self.state.lock();
        if state
            .users
            .values()
            .any(|u| u.username.eq_ignore_ascii_case(&user.username))
        {
            return Err(AppError::Conflict("Username already exists".to_string()));
        }

        let created = User {
            id: next_id(&mut state.next_user_id),
            fullname: user.fullname.clone(),
            username: user.username.clone(),
            email: user.email.clone(),
            password: user.password_hash.clone(),
            role: user.role,
            created_at: Utc::now(),
        };
        state.users.insert(created.id, created.clone());
        Ok(created)
    }

    async fn update(&self, id: i32, changes: &UserChanges) -> AppResult<User> {
        let mut state = self.state.lock();
        let user = state
            .users
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("User with id {} not found", id)))?;

        if let Some(ref fullname) = changes.fullname {
            user.fullname = fullname.clone();
        }
        if let Some(ref email) = changes.email {
            user.email = email.clone();
        }
        if let Some(role) = changes.role {
            user.role = role;
        }
        Ok(user.clone())
    }

    async fn delete(&self, id: i32) -> AppResult<()> {
        let mut state = self.state.lock();
        state.user(id)?;
        if state.records.values().any(|r| r.user_id == id && r.is_active()) {
            return Err(AppError::Conflict(
                "Cannot delete user with active borrows".to_string(),
            ));
        }

        state.records.retain(|_, r| r.user_id != id);
        state.fees.retain(|_, f| f.user_id != id);
        state.users.remove(&id);
        Ok(())
    }

    async fn search(&self, query: &UserQuery) -> AppResult<(Vec<User>, i64)> {
        let state = self.state.lock();
        let mut users: Vec<User> = state
            .users
            .values()
            .filter(|u| {
                query.q.as_deref().map_or(true, |q| {
                    contains_ci(&u.fullname, q)
                        || contains_ci(&u.username, q)
                        || contains_ci(&u.email, q)
                })
            })
            .filter(|u| query.role.map_or(true, |role| u.role == role))
            .cloned()
            .collect();
        users.sort_by(|a, b| a.fullname.cmp(&b.fullname).then(a.id.cmp(&b.id)));

        let total = users.len() as i64;
        Ok((paginate(users, query.page, query.per_page), total))
    }

    async fn counts(&self) -> AppResult<UserCounts> {
        let state = self.state.lock();
        Ok(UserCounts {
            total: state.users.len() as i64,
            students: state
                .users
                .values()
                .filter(|u| u.role == Role::Student)
                .count() as i64,
        })
    }
}

#[async_trait]
impl LoansRepository for InMemoryStore {
    async fn borrow(
        &self,
        user_id: i32,
        book_id: i32,
        borrowed_at: DateTime<Utc>,
        due_at: DateTime<Utc>,
    ) -> AppResult<BorrowRecord> {
        let mut state = self.state.lock();
        state.user(user_id)?;
        if !state.book(book_id)?.is_available() {
            return Err(AppError::Conflict(NOT_AVAILABLE.to_string()));
        }
        if state.active_record(user_id, book_id).is_some() {
            return Err(AppError::Conflict(ALREADY_BORROWED.to_string()));
        }

        let record = BorrowRecord {
            id: next_id(&mut state.next_record_id),
            user_id,
            book_id,
            borrowed_at,
            due_at,
            returned_at: None,
            fine: Decimal::ZERO,
            billed_days: 0,
        };
        if let Some(book) = state.books.get_mut(&book_id) {
            book.available_quantity -= 1;
        }
        state.records.insert(record.id, record.clone());
        Ok(record)
    }

    async fn return_book(
        &self,
        user_id: i32,
        book_id: i32,
        now: DateTime<Utc>,
        policy: FinePolicy,
    ) -> AppResult<ReturnOutcome> {
        let mut state = self.state.lock();
        let mut record = state
            .active_record(user_id, book_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(NOT_BORROWED.to_string()))?;
        let book_title = state.book(book_id)?.title.clone();

        let assessment = policy.assess(&record, now);
        policy.settle(&mut record, &assessment);
        record.returned_at = Some(now);

        let fee = assessment.is_chargeable().then(|| {
            state.insert_fee(
                user_id,
                record.id,
                now,
                assessment.charge,
                late_return_reason(&book_title),
            )
        });
        if let Some(book) = state.books.get_mut(&book_id) {
            book.available_quantity += 1;
        }
        state.records.insert(record.id, record.clone());

        Ok(ReturnOutcome {
            record,
            book_title,
            assessment,
            fee,
        })
    }

    async fn bill_overdue(&self, now: DateTime<Utc>, policy: FinePolicy) -> AppResult<SweepReport> {
        let mut state = self.state.lock();
        let overdue: Vec<BorrowRecord> = state
            .records
            .values()
            .filter(|r| r.is_active() && r.due_at < now)
            .cloned()
            .collect();

        let mut report = SweepReport {
            overdue_records: overdue.len(),
            ..Default::default()
        };

        for mut record in overdue {
            let assessment = policy.assess(&record, now);
            if !assessment.is_chargeable() {
                continue;
            }

            let title = state
                .books
                .get(&record.book_id)
                .map(|b| b.title.clone())
                .unwrap_or_default();
            let first_day = i64::from(record.billed_days) + 1;
            state.insert_fee(
                record.user_id,
                record.id,
                now,
                assessment.charge,
                overdue_reason(&title, first_day, assessment.days_overdue),
            );

            policy.settle(&mut record, &assessment);
            state.records.insert(record.id, record);

            report.fees_created += 1;
            report.total_charged += assessment.charge;
        }

        Ok(report)
    }

    async fn list(&self, filter: LoanFilter) -> AppResult<Vec<LoanRow>> {
        let state = self.state.lock();
        let mut records: Vec<&BorrowRecord> = state
            .records
            .values()
            .filter(|r| filter.user_id.map_or(true, |id| r.user_id == id))
            .filter(|r| filter.book_id.map_or(true, |id| r.book_id == id))
            .filter(|r| !(filter.active_only || filter.overdue_at.is_some()) || r.is_active())
            .filter(|r| filter.overdue_at.map_or(true, |now| r.due_at < now))
            .collect();
        records.sort_by(|a, b| b.borrowed_at.cmp(&a.borrowed_at).then(b.id.cmp(&a.id)));

        Ok(records.into_iter().map(|r| state.loan_row(r)).collect())
    }

    async fn counts(&self, user_id: Option<i32>, now: DateTime<Utc>) -> AppResult<LoanCounts> {
        let state = self.state.lock();
        let mut counts = LoanCounts::default();
        for record in state
            .records
            .values()
            .filter(|r| user_id.map_or(true, |id| r.user_id == id))
        {
            counts.total += 1;
            if record.is_active() {
                counts.active += 1;
                if record.due_at < now {
                    counts.overdue += 1;
                }
            }
        }
        Ok(counts)
    }

    async fn popular_books(&self, limit: i64) -> AppResult<Vec<PopularBook>> {
        let state = self.state.lock();
        let mut borrows: HashMap<i32, i64> = HashMap::new();
        for record in state.records.values() {
            *borrows.entry(record.book_id).or_default() += 1;
        }

        let mut books: Vec<PopularBook> = borrows
            .into_iter()
            .filter_map(|(book_id, borrow_count)| {
                state.books.get(&book_id).map(|b| PopularBook {
                    book_id,
                    title: b.title.clone(),
                    author: b.author.clone(),
                    borrow_count,
                })
            })
            .collect();
        books.sort_by(|a, b| {
            b.borrow_count
                .cmp(&a.borrow_count)
                .then_with(|| a.title.cmp(&b.title))
        });
        books.truncate(limit.max(0) as usize);
        Ok(books)
    }

    async fn active_users(&self, limit: i64) -> AppResult<Vec<ActiveUser>> {
        let state = self.state.lock();
        let mut borrows: HashMap<i32, i64> = HashMap::new();
        for record in state.records.values() {
            *borrows.entry(record.user_id).or_default() += 1;
        }

        let mut users: Vec<ActiveUser> = borrows
            .into_iter()
            .filter_map(|(user_id, borrow_count)| {
                state.users.get(&user_id).map(|u| ActiveUser {
                    user_id,
                    fullname: u.fullname.clone(),
                    username: u.username.clone(),
                    borrow_count,
                })
            })
            .collect();
        users.sort_by(|a, b| {
            b.borrow_count
                .cmp(&a.borrow_count)
                .then_with(|| a.fullname.cmp(&b.fullname))
        });
        users.truncate(limit.max(0) as usize);
        Ok(users)
    }
}

#[async_trait]
impl FeesRepository for InMemoryStore {
    async fn list(&self, user_id: Option<i32>) -> AppResult<Vec<FeeDetails>> {
        let state = self.state.lock();
        let mut fees: Vec<FeeDetails> = state
            .fees
            .values()
            .filter(|f| user_id.map_or(true, |id| f.user_id == id))
            .map(|f| FeeDetails {
                fee: f.clone(),
                user_fullname: state
                    .users
                    .get(&f.user_id)
                    .map(|u| u.fullname.clone())
                    .unwrap_or_default(),
            })
            .collect();
        fees.sort_by(|a, b| {
            b.fee
                .created_at
                .cmp(&a.fee.created_at)
                .then(b.fee.id.cmp(&a.fee.id))
        });
        Ok(fees)
    }

    async fn total(&self, user_id: Option<i32>) -> AppResult<Decimal> {
        let state = self.state.lock();
        Ok(state
            .fees
            .values()
            .filter(|f| user_id.map_or(true, |id| f.user_id == id))
            .map(|f| f.amount)
            .sum())
    }
}
