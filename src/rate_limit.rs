//! Per-category admission gate that spaces outbound requests.
//!
//! Each [`RateCategory`] owns an independent window so an auth storm cannot starve
//! dashboard polling (or the other way around). Admission is a reservation: a caller takes
//! the next free slot under the lock, then sleeps until that instant without holding it.
//! Reservations are handed out in lock order, which makes admission FIFO per category.
//! The limiter never rejects; it only delays.

// self
use crate::{_prelude::*, config::RateLimitConfig};

// Upper bound for a reservation whose spacing would overflow `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Logical endpoint grouping sharing one rate budget.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateCategory {
	/// Endpoints under `/auth/`.
	Auth,
	/// Endpoints under `/dashboard`.
	Dashboard,
	/// Everything else.
	General,
}
impl RateCategory {
	/// Every category, in index order.
	pub const ALL: [RateCategory; 3] =
		[RateCategory::Auth, RateCategory::Dashboard, RateCategory::General];

	/// Routes an endpoint path to its category.
	pub fn for_endpoint(endpoint: &str) -> Self {
		if endpoint.contains("/auth/") {
			RateCategory::Auth
		} else if endpoint.contains("/dashboard") {
			RateCategory::Dashboard
		} else {
			RateCategory::General
		}
	}

	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			RateCategory::Auth => "auth",
			RateCategory::Dashboard => "dashboard",
			RateCategory::General => "general",
		}
	}

	const fn index(self) -> usize {
		match self {
			RateCategory::Auth => 0,
			RateCategory::Dashboard => 1,
			RateCategory::General => 2,
		}
	}
}
impl Display for RateCategory {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Point-in-time view of one category's window.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RateWindow {
	/// Category described by the snapshot.
	pub category: RateCategory,
	/// Minimum gap between two admissions.
	pub min_spacing: Duration,
	/// Most recent recorded admissions, oldest first.
	pub recent: Vec<Instant>,
}

#[derive(Debug, Default)]
struct WindowState {
	last_reserved: Option<Instant>,
	recent: VecDeque<Instant>,
}

/// Per-category spacing gate shared by every in-flight call.
#[derive(Debug)]
pub struct RateLimiter {
	config: RateLimitConfig,
	windows: Mutex<[WindowState; 3]>,
}
impl RateLimiter {
	/// Creates a limiter with the provided per-category spacing.
	pub fn new(config: RateLimitConfig) -> Self {
		Self { config, windows: Default::default() }
	}

	/// Suspends until admitting a request in `category` keeps the minimum spacing.
	///
	/// Other categories and other callers are never blocked while this future sleeps.
	///
	/// Dropping the future before it resolves hands the slot back when no later caller has
	/// reserved behind it.
	pub async fn wait_for_slot(&self, category: RateCategory) {
		let now = Instant::now();
		let reservation = self.reserve(category, now);

		if reservation.admit_at > now {
			tokio::time::sleep_until(reservation.admit_at).await;
		}

		reservation.commit();
	}

	/// Records an admission; call exactly once per admitted request, right before dispatch.
	pub fn record_request(&self, category: RateCategory) {
		let mut windows = self.windows.lock();
		let window = &mut windows[category.index()];

		window.recent.push_back(Instant::now());

		while window.recent.len() > self.config.history.max(1) {
			window.recent.pop_front();
		}
	}

	/// Returns a snapshot of `category`'s window.
	pub fn window(&self, category: RateCategory) -> RateWindow {
		let windows = self.windows.lock();

		RateWindow {
			category,
			min_spacing: self.config.spacing(category),
			recent: windows[category.index()].recent.iter().copied().collect(),
		}
	}

	fn reserve(&self, category: RateCategory, now: Instant) -> Reservation<'_> {
		let spacing = self.config.spacing(category);
		let mut windows = self.windows.lock();
		let window = &mut windows[category.index()];
		let previous = window.last_reserved;
		let admit_at = match previous {
			Some(previous) => previous
				.checked_add(spacing)
				.unwrap_or_else(|| now + FAR_FUTURE)
				.max(now),
			None => now,
		};

		window.last_reserved = Some(admit_at);

		Reservation { limiter: self, category, admit_at, previous, armed: true }
	}
}

/// Slot handed out by [`RateLimiter::reserve`]; rolled back if dropped uncommitted.
struct Reservation<'a> {
	limiter: &'a RateLimiter,
	category: RateCategory,
	admit_at: Instant,
	previous: Option<Instant>,
	armed: bool,
}
impl Reservation<'_> {
	fn commit(mut self) {
		self.armed = false;
	}
}
impl Drop for Reservation<'_> {
	fn drop(&mut self) {
		if !self.armed {
			return;
		}

		let mut windows = self.limiter.windows.lock();
		let window = &mut windows[self.category.index()];

		if window.last_reserved == Some(self.admit_at) {
			window.last_reserved = self.previous;
		}
	}
}

impl Default for RateLimiter {
	fn default() -> Self {
		Self::new(RateLimitConfig::default())
	}
}
