use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, NaiveDate};
use chrono_tz::Tz;
use tokio::time::{sleep, Instant};
use tracing::{error, info, warn};

use crate::candidates::{self, HORIZON_DAYS};
use crate::client::{ScheduleApi, Session};
use crate::error::ApiError;
use crate::matcher::{self, MatchOutcome};
use crate::models::{Candidate, ClassType, MatchedSlot, PollConfig, Preference, ScheduledClass, User};
use crate::schedule::{self, PollCadence};
use crate::summary::{BookingRecord, SummaryWriter};

/// How long the horizon search may run before the token is assumed stale.
const REAUTH_AFTER: Duration = Duration::from_secs(3 * 3600);
/// Back-off after a failed horizon check.
const HORIZON_ERROR_BACKOFF: Duration = Duration::from_secs(30 * 60);
/// Back-off before restarting a cycle that failed at the top level.
const CYCLE_RESTART_BACKOFF: Duration = Duration::from_secs(10 * 60);
/// Cadence of the crawler's "still searching" progress log.
const CRAWL_PROGRESS_EVERY: Duration = Duration::from_secs(3600);

/// One booking worker: a single user and class type, owning its own session
/// and candidate set. Workers never share mutable state; the remote service
/// is the only arbiter of booking conflicts.
pub struct Worker<A> {
    api: A,
    user: User,
    prefs: Vec<Preference>,
    class_type: ClassType,
    tag: String,
    tz: Tz,
    poll: PollConfig,
    summary: Option<SummaryWriter>,
}

impl<A: ScheduleApi + Send + Sync> Worker<A> {
    pub fn new(
        api: A,
        user: User,
        class_type: ClassType,
        tz: Tz,
        poll: PollConfig,
        summary: Option<SummaryWriter>,
    ) -> Self {
        let prefs = user
            .preferences
            .iter()
            .filter(|p| p.class_type == class_type)
            .cloned()
            .collect();
        let tag = format!("{}/{}", user.name, class_type);
        Self {
            api,
            user,
            prefs,
            class_type,
            tag,
            tz,
            poll,
            summary,
        }
    }

    /// Run the daily booking cycle forever. Transient failures degrade to a
    /// slower retry cadence; the worker never gives up.
    pub async fn run(self) {
        info!("[{}] worker started", self.tag);
        loop {
            if let Err(e) = self.run_cycle().await {
                error!(
                    "[{}] cycle failed: {}; restarting in {}s",
                    self.tag,
                    e,
                    CYCLE_RESTART_BACKOFF.as_secs()
                );
                sleep(CYCLE_RESTART_BACKOFF).await;
            }
        }
    }

    /// One operating cycle: authenticate, generate candidates, wait for the
    /// booking horizon to open, match and book, crawl the leftovers, then
    /// sleep into the next operating day.
    async fn run_cycle(&self) -> Result<(), ApiError> {
        let now = self.now();
        let deadline = schedule::next_day_start(now, self.rollover_offset());
        let target = now.date_naive() + ChronoDuration::days(7);

        let mut session = self.enforce_auth().await;

        let scheduled = self.fetch_scheduled(&session).await?;
        let candidates = candidates::generate(
            &self.prefs,
            &scheduled,
            now.naive_local(),
            HORIZON_DAYS,
        );
        if candidates.is_empty() {
            info!("[{}] nothing to book this cycle", self.tag);
            self.sleep_until(deadline).await;
            return Ok(());
        }
        info!("[{}] {} candidates this cycle", self.tag, candidates.len());

        self.wait_for_horizon(&mut session, target).await?;

        let outcome = self.match_and_book(&session, &candidates).await?;
        if !outcome.residual.is_empty() {
            self.crawl(&mut session, outcome.residual, deadline).await?;
        }

        self.sleep_until(deadline).await;
        Ok(())
    }

    /// Authenticate until it sticks, backing off between attempts.
    async fn enforce_auth(&self) -> Session {
        loop {
            match self
                .api
                .authenticate(&self.user.email, &self.user.password)
                .await
            {
                Ok(session) => {
                    info!("[{}] authentication success", self.tag);
                    return session;
                }
                Err(e) => {
                    error!(
                        "[{}] authentication failed: {}; sleeping {} mins",
                        self.tag, e, self.poll.auth_backoff_minutes
                    );
                    sleep(mins(self.poll.auth_backoff_minutes)).await;
                }
            }
        }
    }

    async fn fetch_scheduled(&self, session: &Session) -> Result<Vec<ScheduledClass>, ApiError> {
        let raw = self.api.scheduled_classes(session, self.class_type).await?;
        let mut scheduled = Vec::new();
        for booking in &raw {
            if !booking.status.eq_ignore_ascii_case("active") {
                continue;
            }
            scheduled.push(ScheduledClass::from_remote(booking)?);
        }
        info!(
            "[{}] {} active bookings already on record",
            self.tag,
            scheduled.len()
        );
        Ok(scheduled)
    }

    /// Poll until the remote calendar exposes `target`. Transport and status
    /// failures back off and re-authenticate; only a contract break aborts.
    async fn wait_for_horizon(
        &self,
        session: &mut Session,
        target: NaiveDate,
    ) -> Result<(), ApiError> {
        info!("[{}] start searching for date {}", self.tag, target);
        let cadence = self.cadence();
        let mut started = Instant::now();
        loop {
            match self.furthest_visible_date(session).await {
                Ok(Some(last)) if last >= target => {
                    info!("[{}] found target date (calendar reaches {})", self.tag, last);
                    return Ok(());
                }
                Ok(last) => {
                    let delay = cadence.delay_from(self.now().naive_local());
                    info!(
                        "[{}] target date not available (calendar reaches {:?}); sleeping {}s",
                        self.tag,
                        last,
                        delay.num_seconds()
                    );
                    if started.elapsed() >= REAUTH_AFTER {
                        info!(
                            "[{}] re-auth: 3 hours have passed searching for the target date",
                            self.tag
                        );
                        *session = self.enforce_auth().await;
                        started = Instant::now();
                    }
                    sleep(delay.to_std().unwrap_or(Duration::from_secs(60))).await;
                }
                Err(e @ ApiError::DataShape(_)) => return Err(e),
                Err(e) => {
                    error!(
                        "[{}] horizon check failed: {}; sleeping {}s",
                        self.tag,
                        e,
                        HORIZON_ERROR_BACKOFF.as_secs()
                    );
                    sleep(HORIZON_ERROR_BACKOFF).await;
                    *session = self.enforce_auth().await;
                }
            }
        }
    }

    /// The furthest calendar date the remote inventory currently exposes.
    async fn furthest_visible_date(
        &self,
        session: &Session,
    ) -> Result<Option<NaiveDate>, ApiError> {
        let groups = self.api.slot_inventory(session, self.class_type).await?;
        let mut last = None;
        for group in &groups {
            let date = schedule::parse_remote_date(&group.id)?;
            if last.map_or(true, |l| date > l) {
                last = Some(date);
            }
        }
        Ok(last)
    }

    /// Fetch the inventory once, match every candidate, book every match.
    async fn match_and_book(
        &self,
        session: &Session,
        candidates: &[Candidate],
    ) -> Result<MatchOutcome, ApiError> {
        let groups = self.api.slot_inventory(session, self.class_type).await?;
        let outcome = matcher::match_candidates(&groups, candidates, &session.user_id)?;
        for cand in &outcome.dropped {
            info!(
                "[{}] {} at {} was cancelled by the user before; leaving it alone",
                self.tag, cand.date, cand.time
            );
        }
        for slot in &outcome.matched {
            self.book_slot(session, slot).await?;
        }
        Ok(outcome)
    }

    async fn book_slot(&self, session: &Session, slot: &MatchedSlot) -> Result<(), ApiError> {
        self.api.book(session, &slot.class_id).await?;
        info!("[{}] booked class for {} at {}", self.tag, slot.date, slot.time);
        if let Some(writer) = &self.summary {
            writer.append(&BookingRecord {
                user: &self.user.name,
                class_type: self.class_type,
                date: slot.date,
                time: &slot.time,
                class_id: &slot.class_id,
                booked_at: self.now().to_rfc3339(),
            });
        }
        Ok(())
    }

    /// Bounded re-poll of match+book for candidates the first pass missed.
    /// Runs until the residual set empties or the deadline passes.
    async fn crawl(
        &self,
        session: &mut Session,
        mut residual: Vec<Candidate>,
        deadline: DateTime<Tz>,
    ) -> Result<(), ApiError> {
        info!(
            "[{}] crawler started for {} unavailable candidates",
            self.tag,
            residual.len()
        );
        let mut last_progress = Instant::now();
        while self.now() < deadline && !residual.is_empty() {
            match self.match_and_book(session, &residual).await {
                Ok(outcome) => {
                    residual = outcome.residual;
                    if last_progress.elapsed() >= CRAWL_PROGRESS_EVERY {
                        info!(
                            "[{}] after another hour {} candidates are still not found",
                            self.tag,
                            residual.len()
                        );
                        last_progress = Instant::now();
                    }
                    sleep(Duration::from_secs(self.poll.crawl_interval_secs)).await;
                }
                Err(e @ ApiError::DataShape(_)) => return Err(e),
                Err(e) => {
                    error!(
                        "[{}] crawler hit {}; sleeping {} mins",
                        self.tag, e, self.poll.retry_backoff_minutes
                    );
                    sleep(mins(self.poll.retry_backoff_minutes)).await;
                    *session = self.enforce_auth().await;
                }
            }
        }
        if residual.is_empty() {
            info!("[{}] crawler stopped, all candidates handled", self.tag);
        } else {
            warn!(
                "[{}] crawler stopped at deadline with {} candidates unbooked",
                self.tag,
                residual.len()
            );
        }
        Ok(())
    }

    async fn sleep_until(&self, deadline: DateTime<Tz>) {
        let now = self.now();
        if deadline > now {
            let dur = (deadline - now).to_std().unwrap_or(Duration::from_secs(60));
            info!(
                "[{}] cycle done, sleeping {}s until the next operating day",
                self.tag,
                dur.as_secs()
            );
            sleep(dur).await;
        }
    }

    fn now(&self) -> DateTime<Tz> {
        schedule::now(self.tz)
    }

    fn cadence(&self) -> PollCadence {
        match self.poll.horizon_interval_minutes {
            Some(m) => PollCadence::Every(ChronoDuration::minutes(m as i64)),
            None => PollCadence::NextHour,
        }
    }

    fn rollover_offset(&self) -> i64 {
        self.poll
            .rollover_offset_minutes
            .unwrap_or(self.class_type.rollover_offset_min())
    }
}

fn mins(m: u64) -> Duration {
    Duration::from_secs(m * 60)
}
