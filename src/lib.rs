//! Distributed control plane binding a remote crawl Agent and a central
//! Server for discovering and mapping HTML form pages across
//! authenticated enterprise web applications (see `SPEC_FULL.md`).
//!
//! Module-to-component mapping:
//!
//! | Component | Module |
//! |---|---|
//! | C1 Budget Gate | [`budget`] |
//! | C2 AI Broker | [`ai_broker`] |
//! | C3 Task Bus | [`task_bus`] |
//! | C4 Crawl Engine | [`crawl_engine`] |
//! | C5 Mapper Orchestrator | [`mapper`] |
//! | shared entities | [`domain`] |
//! | persistence traits + in-memory impl | [`store`] |
//! | HTTP surface | [`server`] |

pub mod ai_broker;
pub mod budget;
pub mod crawl_engine;
pub mod domain;
pub mod mapper;
pub mod server;
pub mod store;
pub mod task_bus;

pub use server::{router, AppState, AppStateInner, ReqwestAiProvider};
