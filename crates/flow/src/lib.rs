//! Crate `flow`: motor de workflows del ciclo de vida de moldes
//!
//! Mueve un molde por transferencia, reparación y desecho. Cada tipo tiene su
//! propia enumeración de estados (`status`), una tabla pura de transiciones
//! legales (`transitions`) y, para transferencia y desecho, una cadena de
//! etapas de aprobación ordenadas (`approval`).
//!
//! Diseño resumido:
//! - Unidad de trabajo: `WorkflowStore::transaction` entrega un `WorkflowTx`
//!   que se pasa por motor, cadena, efectos e historial; cualquier `Err`
//!   revierte todo.
//! - Bloqueo de fila por workflow y por molde antes de mutar.
//! - Efectos sobre el molde sólo en la transición a éxito terminal.
//! - Historial append-only, una entrada por mutación.
//! - Idempotencia: `command_id` opcional en cada mutación.
//!
//! Ejemplo rápido:
//! ```rust
//! use flow::stubs::{InMemoryWorkflowStore, LogNotificationSink, StaticAuthorizer};
//! use flow::{Role, WorkflowConfig, WorkflowEngine, WorkflowService};
//! use std::sync::Arc;
//! let maker = uuid::Uuid::new_v4();
//! let service = WorkflowService::new(Arc::new(InMemoryWorkflowStore::new()),
//!                                    WorkflowEngine::new(WorkflowConfig::default()),
//!                                    Arc::new(StaticAuthorizer::new().with(maker, Role::Maker)),
//!                                    Arc::new(LogNotificationSink));
//! assert!(service.list_workflows(flow::WorkflowKind::Repair, &Default::default()).unwrap().is_empty());
//! ```
pub mod approval;
pub mod authorization;
pub mod config;
pub mod domain;
pub mod engine;
pub mod errors;
pub mod history;
pub mod repository;
pub mod service;
pub mod side_effects;
pub mod status;
pub mod stubs;
pub mod transitions;

pub use approval::{ApprovalChain, ChainState, SCRAPPING_STAGES, TRANSFER_STAGES};
pub use authorization::{Actor, Authorizer, Role};
pub use config::{SameStatePolicy, WorkflowConfig};
pub use domain::*;
pub use engine::{NewWorkflow, WorkflowEngine};
pub use errors::*;
pub use history::HistoryRecorder;
pub use repository::*;
pub use service::WorkflowService;
pub use side_effects::{SideEffect, SideEffectApplier};
pub use status::*;
pub use transitions::is_legal;
