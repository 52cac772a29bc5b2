// std
use std::{
	sync::Arc,
	time::{Duration, Instant},
};
// crates.io
use futures::future;
// self
use lms_api::{cancel::CancelToken, error::Error, rate_limit::RateLimiter};

const RATE: f64 = 5.;
const REQUESTS: usize = 20;
// Absorbs timer wake-up latency between a grant and the moment it is observed.
const WINDOW: Duration = Duration::from_millis(950);

fn max_grants_per_window(grants: &mut [Instant]) -> usize {
	grants.sort();

	(0..grants.len())
		.map(|i| {
			grants[i..].iter().take_while(|at| at.duration_since(grants[i]) < WINDOW).count()
		})
		.max()
		.unwrap_or(0)
}

async fn timed_acquire(limiter: Arc<RateLimiter>, cancel: CancelToken) -> Result<Instant, Error> {
	limiter.acquire(&cancel).await.map(|()| Instant::now())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn sustained_load_is_paced_to_the_configured_rate() {
	let limiter = Arc::new(RateLimiter::new(RATE, 1));
	let cancel = CancelToken::new();
	let start = Instant::now();
	let mut grants = future::join_all(
		(0..REQUESTS).map(|_| timed_acquire(limiter.clone(), cancel.clone())),
	)
	.await
	.into_iter()
	.collect::<Result<Vec<_>, _>>()
	.expect("Uncancelled waits should be granted.");
	let elapsed = start.elapsed();

	assert!(elapsed >= Duration::from_millis(3_750), "Finished too quickly: {elapsed:?}.");

	let busiest = max_grants_per_window(&mut grants);

	assert!(busiest <= RATE as usize, "{busiest} grants within one second.");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cancelled_waiters_in_the_middle_of_the_queue_do_not_inflate_the_rate() {
	let limiter = Arc::new(RateLimiter::new(RATE, 1));
	let keep = CancelToken::new();
	let doomed = CancelToken::new();
	let mut grants =
		vec![timed_acquire(limiter.clone(), keep.clone()).await.expect("First slot is free.")];
	let mut queued = (1..10)
		.map(|i| {
			let cancel = if (1..=5).contains(&i) { doomed.clone() } else { keep.clone() };

			tokio::spawn(timed_acquire(limiter.clone(), cancel))
		})
		.collect::<Vec<_>>();

	tokio::time::sleep(Duration::from_millis(10)).await;
	doomed.cancel();
	queued.extend((0..5).map(|_| tokio::spawn(timed_acquire(limiter.clone(), keep.clone()))));

	let mut cancelled = 0;

	for handle in queued {
		match handle.await.expect("Waiter task should not panic.") {
			Ok(at) => grants.push(at),
			Err(Error::Cancelled) => cancelled += 1,
			Err(e) => panic!("Unexpected limiter error: {e:?}."),
		}
	}

	assert_eq!(cancelled, 5);
	assert_eq!(grants.len(), 10);

	let busiest = max_grants_per_window(&mut grants);

	assert!(busiest <= RATE as usize, "{busiest} grants within one second.");
}

#[tokio::test]
async fn cancellation_unblocks_waiters_without_leaking_slots() {
	let limiter = RateLimiter::new(1., 1);
	let cancel = CancelToken::new();

	limiter.acquire(&cancel).await.expect("First slot should be free.");

	let doomed = CancelToken::new();
	let trigger = doomed.clone();
	let (result, ()) = tokio::join!(limiter.acquire(&doomed), async move {
		tokio::time::sleep(Duration::from_millis(200)).await;
		trigger.cancel();
	});

	assert!(matches!(result, Err(Error::Cancelled)));

	let start = Instant::now();

	limiter.acquire(&cancel).await.expect("Next slot should be granted.");

	// Only the first grant's emission interval is owed.
	assert!(start.elapsed() < Duration::from_secs(1), "Waited {:?}.", start.elapsed());
}
