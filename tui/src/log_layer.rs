//! Small `tracing_subscriber` layer feeding formatted log lines into the
//! in-app debug log view. Only `on_event` matters; spans are ignored.

use std::fmt::Write as _;

use tokio::sync::mpsc::UnboundedSender;
use tracing::Event;
use tracing::Subscriber;
use tracing::field::Field;
use tracing::field::Visit;
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;

pub(crate) struct TuiLogLayer {
    tx: UnboundedSender<String>,
}

impl TuiLogLayer {
    pub(crate) fn new(tx: UnboundedSender<String>) -> Self {
        Self { tx }
    }
}

impl<S> Layer<S> for TuiLogLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        struct Visitor<'a> {
            buf: &'a mut String,
        }

        impl Visit for Visitor<'_> {
            fn record_debug(&mut self, _field: &Field, value: &dyn std::fmt::Debug) {
                let _ = write!(self.buf, " {value:?}");
            }
        }

        let mut buf = String::new();
        let _ = write!(
            buf,
            "[{} {}]",
            event.metadata().level(),
            event.metadata().target()
        );
        event.record(&mut Visitor { buf: &mut buf });

        let sanitized = buf.replace(['\n', '\r'], " ");
        let _ = self.tx.send(sanitized);
    }
}
