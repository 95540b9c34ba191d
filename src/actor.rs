//! Control units ("actors").
//!
//! A unit is a piece of private state plus a bounded inbox.  Its run loop
//! is the only code that ever touches the state, so no locks are needed.
//! Other units hold an [`Address`] and can only post messages.
//!
//! ```text
//!  ┌───────────┐  Address::send   ┌─────────────────────────────────┐
//!  │ other unit│─────────────────▶│ inbox (embassy Channel, FIFO)   │
//!  └───────────┘                  │              │                  │
//!                                 │              ▼                  │
//!  TimerSlot deadline ───────────▶│  run loop ─▶ Actor::handle      │
//!                                 │              │                  │
//!  Context::defer  ─▶ deferred ───▶│  (drained before the inbox)     │
//!                                 └─────────────────────────────────┘
//! ```
//!
//! All units of one controller share a single thread and are driven by an
//! `edge_executor::LocalExecutor`.  A delay never blocks the inbox: the
//! loop races the inbox against the unit's single timer.  A unit hands the
//! executor back after every [`Actor::BATCH`] messages, so the units it
//! posts to get to drain their inboxes in between.
//!
//! A handler returning [`TaskError::Fatal`] ends the unit.  There is no
//! restart; supervision belongs to whoever spawned the unit.

use core::cell::Cell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::{Duration, Instant};

use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embassy_sync::channel::Channel;
use futures_lite::future;
use log::{debug, error, info, warn};

use crate::error::{MailboxError, TaskError, TaskResult};
use crate::scheduler::TimerSlot;

/// Inbox depth for every unit.
pub const MAILBOX_DEPTH: usize = 16;

// ───────────────────────────────────────────────────────────────
// Unit behaviour
// ───────────────────────────────────────────────────────────────

/// Handler-side view of the owning unit: its timer and its self-queue.
pub trait Context<M> {
    /// Arm the unit's timer; supersedes any pending task.
    fn schedule_once(&mut self, delay: Duration, message: M);

    /// Cancel the pending task, if any.  Idempotent.
    fn cancel(&mut self);

    /// Queue `message` for the unit itself.  It is handled after the
    /// current handler returns, outside its call stack, and ahead of
    /// anything waiting in the inbox.  Fails only when the unit keeps
    /// deferring without ever draining.
    fn defer(&mut self, message: M) -> Result<(), MailboxError>;
}

/// Behaviour of a control unit.
pub trait Actor {
    type Message;

    /// Messages handled per executor turn.  Units that fan commands out to
    /// other units keep this at 1; pure command sinks can drain a whole
    /// inbox at once.
    const BATCH: usize = 1;

    fn name(&self) -> &str;

    /// Runs once before the first message.
    fn on_start(&mut self, _ctx: &mut dyn Context<Self::Message>) -> TaskResult {
        Ok(())
    }

    /// Handle one message.
    fn handle(&mut self, message: Self::Message, ctx: &mut dyn Context<Self::Message>)
    -> TaskResult;

    /// Runs once when the loop exits, after the timer was cancelled.
    fn on_stop(&mut self) {}
}

// ───────────────────────────────────────────────────────────────
// Addressing
// ───────────────────────────────────────────────────────────────

enum Envelope<M> {
    Message(M),
    Stop,
}

type Inbox<M> = Channel<NoopRawMutex, Envelope<M>, MAILBOX_DEPTH>;

/// Sending half of a unit's inbox.  Cheap to clone.
pub struct Address<M> {
    inbox: Rc<Inbox<M>>,
    alive: Rc<Cell<bool>>,
}

impl<M> Clone for Address<M> {
    fn clone(&self) -> Self {
        Self {
            inbox: Rc::clone(&self.inbox),
            alive: Rc::clone(&self.alive),
        }
    }
}

impl<M> Address<M> {
    fn new() -> Self {
        Self {
            inbox: Rc::new(Channel::new()),
            alive: Rc::new(Cell::new(true)),
        }
    }

    /// Post a message without waiting.  Fails if the inbox is full or the
    /// unit has stopped.
    pub fn send(&self, message: M) -> Result<(), MailboxError> {
        self.post(Envelope::Message(message))
    }

    /// Post a message, waiting for room in the inbox.
    pub async fn send_async(&self, message: M) -> Result<(), MailboxError> {
        if !self.alive.get() {
            return Err(MailboxError::Closed);
        }
        self.inbox.send(Envelope::Message(message)).await;
        Ok(())
    }

    /// Ask the unit to stop after the messages already queued.
    pub fn stop(&self) -> Result<(), MailboxError> {
        self.post(Envelope::Stop)
    }

    /// False once the unit's loop has exited.
    pub fn is_alive(&self) -> bool {
        self.alive.get()
    }

    fn post(&self, envelope: Envelope<M>) -> Result<(), MailboxError> {
        if !self.alive.get() {
            return Err(MailboxError::Closed);
        }
        self.inbox.try_send(envelope).map_err(|_| MailboxError::Full)
    }
}

// ───────────────────────────────────────────────────────────────
// Run loop
// ───────────────────────────────────────────────────────────────

/// Context handed to handlers by the run loop.
struct UnitContext<M> {
    timer: TimerSlot<M>,
    deferred: VecDeque<M>,
}

impl<M> Context<M> for UnitContext<M> {
    fn schedule_once(&mut self, delay: Duration, message: M) {
        self.timer.arm(delay, message);
    }

    fn cancel(&mut self) {
        self.timer.cancel();
    }

    fn defer(&mut self, message: M) -> Result<(), MailboxError> {
        push_deferred(&mut self.deferred, message)
    }
}

fn push_deferred<M>(queue: &mut VecDeque<M>, message: M) -> Result<(), MailboxError> {
    if queue.len() >= MAILBOX_DEPTH {
        warn!("deferred queue full");
        return Err(MailboxError::Full);
    }
    queue.push_back(message);
    Ok(())
}

enum Wake<M> {
    Inbox(Envelope<M>),
    Timer,
}

/// Create a unit and return its address together with the future that
/// runs it.  Spawn the future on the controller's executor.
pub fn unit<A>(actor: A) -> (Address<A::Message>, impl Future<Output = ()>)
where
    A: Actor,
{
    let address = Address::new();
    let run = run(actor, address.clone());
    (address, run)
}

async fn run<A: Actor>(mut actor: A, own: Address<A::Message>) {
    let Address { inbox, alive } = own;
    let mut ctx = UnitContext {
        timer: TimerSlot::new(),
        deferred: VecDeque::new(),
    };

    info!("{}: unit started", actor.name());
    let mut outcome = actor.on_start(&mut ctx);
    let mut handled = 0;

    while !is_fatal(&actor, &mut outcome) {
        if handled >= A::BATCH {
            future::yield_now().await;
            handled = 0;
        }

        let message = match ctx.deferred.pop_front() {
            Some(m) => m,
            None => match next_wake(&inbox, &ctx.timer).await {
                Wake::Inbox(Envelope::Message(m)) => m,
                Wake::Inbox(Envelope::Stop) => {
                    info!("{}: stop requested", actor.name());
                    break;
                }
                Wake::Timer => match ctx.timer.take_due(Instant::now()) {
                    Some(m) => m,
                    None => continue,
                },
            },
        };

        outcome = actor.handle(message, &mut ctx);
        handled += 1;
    }

    alive.set(false);
    ctx.timer.cancel();
    actor.on_stop();
    info!("{}: unit stopped", actor.name());
}

/// Wait for the next inbox envelope or the timer deadline, whichever
/// comes first.  An expired deadline wins without touching the inbox.
async fn next_wake<M>(inbox: &Inbox<M>, timer: &TimerSlot<M>) -> Wake<M> {
    let Some(deadline) = timer.deadline() else {
        return Wake::Inbox(inbox.receive().await);
    };
    let wait = deadline.saturating_duration_since(Instant::now());
    if wait.is_zero() {
        return Wake::Timer;
    }
    future::or(async { Wake::Inbox(inbox.receive().await) }, async {
        async_io_mini::Timer::after(wait).await;
        Wake::Timer
    })
    .await
}

/// Classify a handler outcome.  Logs fatal failures.
fn is_fatal<A: Actor>(actor: &A, outcome: &mut TaskResult) -> bool {
    match core::mem::replace(outcome, Ok(())) {
        Ok(()) => false,
        Err(TaskError::StopRepeat) => {
            debug!("{}: task stopped repeating", actor.name());
            false
        }
        Err(TaskError::Fatal(e)) => {
            error!("{}: FATAL, unit no longer processes messages: {e:#}", actor.name());
            true
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Manual stepping
// ───────────────────────────────────────────────────────────────

/// A [`Context`] with no clock: scheduled tasks wait until [`fire`] is
/// called and deferred messages until [`drain`].  Used to step a unit
/// deterministically (simulation, tests).
///
/// [`fire`]: ManualContext::fire
/// [`drain`]: ManualContext::drain
pub struct ManualContext<M> {
    scheduled: Option<(Duration, M)>,
    deferred: VecDeque<M>,
    cancels: usize,
}

impl<M> ManualContext<M> {
    pub fn new() -> Self {
        Self {
            scheduled: None,
            deferred: VecDeque::new(),
            cancels: 0,
        }
    }

    /// The pending task and its delay.
    pub fn scheduled(&self) -> Option<(Duration, &M)> {
        self.scheduled.as_ref().map(|(d, m)| (*d, m))
    }

    /// Messages posted to self and not yet handled.
    pub fn deferred(&self) -> impl Iterator<Item = &M> {
        self.deferred.iter()
    }

    /// How many times the unit cancelled its timer.
    pub fn cancel_count(&self) -> usize {
        self.cancels
    }

    /// Expire the pending task: handle its message, then any deferred ones.
    /// Returns `Ok(false)` when nothing was pending.
    pub fn fire<A>(&mut self, actor: &mut A) -> Result<bool, TaskError>
    where
        A: Actor<Message = M>,
    {
        let Some((_, message)) = self.scheduled.take() else {
            return Ok(false);
        };
        actor.handle(message, self)?;
        self.drain(actor)?;
        Ok(true)
    }

    /// Deliver `message`, then every deferred message, in order.
    pub fn deliver<A>(&mut self, actor: &mut A, message: M) -> TaskResult
    where
        A: Actor<Message = M>,
    {
        actor.handle(message, self)?;
        self.drain(actor)
    }

    /// Handle deferred messages until none are left.
    pub fn drain<A>(&mut self, actor: &mut A) -> TaskResult
    where
        A: Actor<Message = M>,
    {
        while let Some(message) = self.deferred.pop_front() {
            actor.handle(message, self)?;
        }
        Ok(())
    }
}

impl<M> Default for ManualContext<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> Context<M> for ManualContext<M> {
    fn schedule_once(&mut self, delay: Duration, message: M) {
        self.scheduled = Some((delay, message));
    }

    fn cancel(&mut self) {
        self.cancels += 1;
        self.scheduled = None;
    }

    fn defer(&mut self, message: M) -> Result<(), MailboxError> {
        push_deferred(&mut self.deferred, message)
    }
}
