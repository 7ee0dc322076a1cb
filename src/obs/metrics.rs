// self
use crate::{obs::CallOutcome, rate_limit::RateCategory};

/// Records a call outcome via the global metrics recorder (when enabled).
pub fn record_call_outcome(category: RateCategory, outcome: CallOutcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"admin_api_call_total",
			"category" => category.as_str(),
			"outcome" => outcome.as_str()
		)
		.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (category, outcome);
	}
}

/// Records a refresh outcome via the global metrics recorder (when enabled).
pub fn record_refresh_outcome(outcome: CallOutcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!("admin_api_refresh_total", "outcome" => outcome.as_str()).increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = outcome;
	}
}
