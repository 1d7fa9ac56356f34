// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Starlab Core - Star Observation Request Engine
//!
//! This crate owns the lifecycle of star observation requests: draft baskets
//! of telescope ("scope") selections that accumulate calculation line items,
//! get formed by their owner and are completed or declined by a moderator.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      starlab-server (HTTP)                    │
//! │          bearer token ──▶ Identity, explicit per call         │
//! └──────────────────────────────────────────────────────────────┘
//!                                │
//!        ┌───────────────┬───────┴────────┬──────────────────┐
//!        ▼               ▼                ▼                  ▼
//! ┌─────────────┐ ┌─────────────┐ ┌───────────────┐ ┌────────────────┐
//! │  accounts   │ │   catalog   │ │   lifecycle   │ │    dispatch    │
//! │ login/token │ │ scope CRUD  │ │ state machine │ │ compute jobs + │
//! └─────────────┘ └─────────────┘ └───────────────┘ │   callbacks    │
//!                                   │     │         └────────────────┘
//!                          ┌────────┘     └────────┐
//!                          ▼                       ▼
//!                   ┌─────────────┐        ┌──────────────┐
//!                   │ line_items  │        │ calculation  │
//!                   └─────────────┘        └──────────────┘
//!                                │
//!                                ▼
//!                   ┌──────────────────────────┐
//!                   │ Persistence (PostgreSQL) │
//!                   └──────────────────────────┘
//! ```
//!
//! # Star Lifecycle
//!
//! | From | Action | Actor | To |
//! |------|--------|-------|----|
//! | (none) | add scope to basket | User/Moderator | `active` |
//! | `active` | form | owner | `formed` |
//! | `formed` | finish (completed) | Moderator | `completed`, triggers calculation |
//! | `formed` | finish (declined) | Moderator | `declined` |
//! | `active`, `formed` | delete | owner or Moderator | `deleted` |
//! | `active` | remove last line item | owner | `deleted` |
//!
//! A user has at most one `active` star. Every transition is a
//! compare-and-set on the current status, so concurrent actors cannot both
//! pass the same guard.
//!
//! # Calculation Modes
//!
//! Completion either computes outputs in-process ([`lifecycle::CalculationMode::Sync`])
//! or posts every line item to an external compute service and waits for its
//! callbacks ([`lifecycle::CalculationMode::Async`]). A process runs exactly
//! one mode.

#![deny(unsafe_code)]

pub mod accounts;
pub mod authz;
pub mod calculation;
pub mod catalog;
pub mod dispatch;
pub mod error;
pub mod identity;
pub mod lifecycle;
pub mod line_items;
pub mod migrations;
pub mod model;
pub mod object_store;
pub mod persistence;

pub use error::{CoreError, Result};
pub use identity::{Identity, TokenAuthority};
pub use model::{Role, StarStatus};
