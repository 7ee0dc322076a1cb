// self
use crate::{_prelude::*, http::Method, obs::SpanKind, rate_limit::RateCategory};

/// Emits a `tracing` event at the given level when the `tracing` feature is enabled.
macro_rules! log_event {
	($level:ident, $($arg:tt)+) => {{
		#[cfg(feature = "tracing")]
		{
			::tracing::$level!($($arg)+);
		}
	}};
}
pub(crate) use log_event;

/// Type alias that resolves to an instrumented future when tracing is enabled.
#[cfg(feature = "tracing")]
pub type InstrumentedCall<F> = tracing::instrument::Instrumented<F>;
/// Passthrough future type when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedCall<F> = F;

/// A span builder used by pipeline calls and refreshes.
#[derive(Clone, Debug)]
pub struct CallSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl CallSpan {
	/// Creates a span for one logical pipeline call.
	pub fn call(method: Method, endpoint: &str, category: RateCategory) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!(
				"admin_api.call",
				kind = SpanKind::Call.as_str(),
				method = method.as_str(),
				endpoint,
				category = category.as_str(),
			);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (method, endpoint, category);

			Self {}
		}
	}

	/// Creates a span for one refresh-endpoint round trip.
	pub fn refresh() -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!("admin_api.refresh", kind = SpanKind::Refresh.as_str());

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			Self {}
		}
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedCall<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			use tracing::Instrument;

			fut.instrument(self.span.clone())
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[tokio::test]
	async fn instrument_wraps_future() {
		let span = CallSpan::call(Method::Get, "/dashboard/stats", RateCategory::Dashboard);
		let value = span.instrument(async { 42 }).await;

		assert_eq!(value, 42);
		assert_eq!(CallSpan::refresh().instrument(async { "ok" }).await, "ok");
	}
}
