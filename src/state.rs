// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use crate::mediator::Mediator;

#[derive(Clone)]
pub struct AppState {
    pub mediator: Arc<Mediator>,
}

impl AppState {
    pub fn new(mediator: Mediator) -> Self {
        Self {
            mediator: Arc::new(mediator),
        }
    }
}
