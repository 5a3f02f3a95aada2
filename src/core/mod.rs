// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025-2026 JR Morton

//! Core runtime: events, host facts, state, dispatch and orchestration.

pub mod app_state;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod host;
pub mod orchestrator;
