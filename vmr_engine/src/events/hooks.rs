use std::{future::Future, pin::Pin, sync::Arc};

use crate::events::{BatchReconciledEvent, EventHandler, EventProducer, Handler, OrderClassifiedEvent};

#[derive(Default, Clone)]
pub struct EventProducers {
    pub order_classified_producer: Vec<EventProducer<OrderClassifiedEvent>>,
    pub batch_reconciled_producer: Vec<EventProducer<BatchReconciledEvent>>,
}

pub struct EventHandlers {
    pub on_order_classified: Option<EventHandler<OrderClassifiedEvent>>,
    pub on_batch_reconciled: Option<EventHandler<BatchReconciledEvent>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        let on_order_classified = hooks.on_order_classified.map(|f| EventHandler::new(buffer_size, f));
        let on_batch_reconciled = hooks.on_batch_reconciled.map(|f| EventHandler::new(buffer_size, f));
        Self { on_order_classified, on_batch_reconciled }
    }

    pub fn producers(&self) -> EventProducers {
        let mut result = EventProducers::default();
        if let Some(handler) = &self.on_order_classified {
            result.order_classified_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_batch_reconciled {
            result.batch_reconciled_producer.push(handler.subscribe());
        }
        result
    }

    pub async fn start_handlers(self) {
        if let Some(handler) = self.on_order_classified {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
        if let Some(handler) = self.on_batch_reconciled {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
    }
}

#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_order_classified: Option<Handler<OrderClassifiedEvent>>,
    pub on_batch_reconciled: Option<Handler<BatchReconciledEvent>>,
}

impl EventHooks {
    pub fn on_order_classified<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OrderClassifiedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_order_classified = Some(Arc::new(f));
        self
    }

    pub fn on_batch_reconciled<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(BatchReconciledEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_batch_reconciled = Some(Arc::new(f));
        self
    }
}
