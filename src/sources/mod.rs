// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025-2026 JR Morton

pub mod classify;
pub mod history;
pub mod identity;
pub mod logtamper;
pub mod tail;
