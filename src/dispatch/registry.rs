use std::sync::Arc;

use super::{ContextBound, ContextFree, Handler};
use crate::context::SharedContext;
use crate::handlers;

/// Every subject the worker answers on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    Ping,
    Send,
}

impl Route {
    pub const ALL: [Route; 2] = [Route::Ping, Route::Send];

    pub fn subject(self) -> &'static str {
        match self {
            Route::Ping => "mailer.ping",
            Route::Send => "mailer.send",
        }
    }

    fn bind(self, context: &Arc<SharedContext>) -> Arc<dyn Handler> {
        match self {
            Route::Ping => Arc::new(ContextFree::new(handlers::ping)),
            Route::Send => Arc::new(ContextBound::new(Arc::clone(context), handlers::send)),
        }
    }
}

pub struct Binding {
    pub route: Route,
    pub handler: Arc<dyn Handler>,
}

/// Subject -> handler table, fixed at startup.
pub struct Registry {
    bindings: Vec<Binding>,
}

impl Registry {
    pub fn new(context: Arc<SharedContext>) -> Self {
        let bindings = Route::ALL
            .into_iter()
            .map(|route| Binding {
                route,
                handler: route.bind(&context),
            })
            .collect();

        Self { bindings }
    }

    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }
}
