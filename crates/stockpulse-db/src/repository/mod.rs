//! # Repository Module
//!
//! Database repository implementations for the StockPulse ledger.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Two Kinds of Repository Method                       │
//! │                                                                         │
//! │  Reads and standalone writes take &self and use the pool:              │
//! │       db.products().get_by_id(id)                                       │
//! │       db.movements().list_for(product_id, 50, cursor)                   │
//! │                                                                         │
//! │  Writes that belong to a settlement take the caller's connection       │
//! │  (`*_in` methods) so one transaction covers all of them:               │
//! │       let mut tx = db.begin().await?;                                   │
//! │       db.sequences().mint_in(&mut tx, kind, day)                        │
//! │       db.documents().insert_in(&mut tx, &document)                      │
//! │       db.products().apply_stock_delta(&mut tx, id, -2, floor, now)      │
//! │       db.movements().append_in(&mut tx, &movement, now)                 │
//! │       db.payments().record_in(&mut tx, &payment)                        │
//! │       tx.commit().await?;                                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`product::ProductRepository`] - Catalog lookups and conditional stock updates
//! - [`movement::MovementRepository`] - Append-only movement ledger
//! - [`sequence::SequenceRepository`] - Durable document counters
//! - [`document::DocumentRepository`] - Settled documents and lines
//! - [`payment::PaymentRepository`] - Payment transactions
//! - [`service_job::ServiceJobRepository`] - Repair jobs

pub mod document;
pub mod movement;
pub mod payment;
pub mod product;
pub mod sequence;
pub mod service_job;
