//! # Event Channel
//!
//! One-shot notifications (collision, sound cue, rocket launch) that travel
//! beside the snapshots, never inside them.
//!
//! ## Event Flow
//! ```text
//! 1. Server system: outbox.emit(&CollisionEvent { .. })   -> serialized now
//! 2. End of tick:   every pending event broadcast reliably, once
//! 3. Client:        dispatcher.dispatch(message)
//! 4. Client:        subscribed handlers run once per event sequence
//! ```
//!
//! The reliable channel is exactly-once only in the nominal case, so the
//! dispatcher drops any sequence it has already seen within its window.

use std::any::Any;
use std::collections::{HashMap, HashSet, VecDeque};

use crate::error::{ProtocolError, ProtocolResult};
use crate::protocol::{split_message, MessageKind, WireReader, WireWriter, EVENT_KIND_BASE};

/// Default number of recent event sequences remembered for deduplication.
pub const DEFAULT_DEDUP_WINDOW: usize = 1024;

/// A discrete event with its own small wire schema.
pub trait NetEvent: Sized + Send + 'static {
    /// Event kind; sent as message byte `0x40 + KIND`.
    const KIND: u8;
    /// Symbolic name, for logs.
    const NAME: &'static str;

    /// Writes the fields.
    fn encode(&self, writer: &mut WireWriter);

    /// Reads the fields.
    fn decode(reader: &mut WireReader<'_>) -> ProtocolResult<Self>;
}

fn assert_kind<E: NetEvent>() {
    assert!(
        E::KIND < u8::MAX - EVENT_KIND_BASE + 1,
        "event {} kind {} does not fit a message byte",
        E::NAME,
        E::KIND
    );
}

/// Server-side queue of serialized events for this tick.
#[derive(Debug)]
pub struct EventOutbox {
    next_sequence: u32,
    pending: Vec<Vec<u8>>,
}

impl EventOutbox {
    /// Creates an empty outbox. Sequences start at 1.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_sequence: 1,
            pending: Vec::new(),
        }
    }

    /// Serializes `event` and queues it for the end-of-tick broadcast.
    ///
    /// Returns the event's sequence number.
    pub fn emit<E: NetEvent>(&mut self, event: &E) -> u32 {
        assert_kind::<E>();
        let sequence = self.next_sequence;
        self.next_sequence = self.next_sequence.wrapping_add(1);

        let mut writer = WireWriter::with_capacity(32);
        writer.write_u8(MessageKind::Event(E::KIND).to_byte());
        writer.write_u32(sequence);
        event.encode(&mut writer);
        self.pending.push(writer.into_bytes());

        tracing::trace!(event = E::NAME, sequence, "event queued");
        sequence
    }

    /// Number of events waiting for broadcast.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// True if nothing is waiting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Takes every queued message.
    pub fn drain(&mut self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.pending)
    }
}

impl Default for EventOutbox {
    fn default() -> Self {
        Self::new()
    }
}

type EventDecoder = fn(&mut WireReader<'_>) -> ProtocolResult<Box<dyn Any + Send>>;
type EventHandler = Box<dyn FnMut(&dyn Any) + Send>;

fn decode_event<E: NetEvent>(reader: &mut WireReader<'_>) -> ProtocolResult<Box<dyn Any + Send>> {
    Ok(Box::new(E::decode(reader)?))
}

struct Route {
    name: &'static str,
    decode: EventDecoder,
    handlers: Vec<EventHandler>,
}

/// Bounded memory of recently seen sequence numbers.
#[derive(Debug)]
struct RecentSequences {
    window: usize,
    order: VecDeque<u32>,
    seen: HashSet<u32>,
}

impl RecentSequences {
    fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
            order: VecDeque::with_capacity(window.max(1)),
            seen: HashSet::with_capacity(window.max(1)),
        }
    }

    fn clear(&mut self) {
        self.order.clear();
        self.seen.clear();
    }

    /// Records `sequence`; returns false if it was already present.
    fn insert(&mut self, sequence: u32) -> bool {
        if !self.seen.insert(sequence) {
            return false;
        }
        self.order.push_back(sequence);
        if self.order.len() > self.window {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        true
    }
}

/// What [`EventDispatcher::dispatch`] did with a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dispatch {
    /// Handlers ran (possibly zero of them).
    Delivered,
    /// Sequence already seen; handlers not run again.
    Duplicate,
}

/// Client-side event router.
pub struct EventDispatcher {
    routes: HashMap<u8, Route>,
    recent: RecentSequences,
    duplicates: u64,
}

impl EventDispatcher {
    /// Creates a dispatcher remembering `dedup_window` recent sequences.
    #[must_use]
    pub fn new(dedup_window: usize) -> Self {
        Self {
            routes: HashMap::new(),
            recent: RecentSequences::new(dedup_window),
            duplicates: 0,
        }
    }

    /// Declares `E` as a known event kind.
    ///
    /// # Panics
    ///
    /// Panics if another event type already uses `E::KIND`.
    pub fn register<E: NetEvent>(&mut self) {
        assert_kind::<E>();
        let route = self.routes.entry(E::KIND).or_insert_with(|| Route {
            name: E::NAME,
            decode: decode_event::<E>,
            handlers: Vec::new(),
        });
        assert!(
            route.name == E::NAME,
            "event kind {} used by both {} and {}",
            E::KIND,
            route.name,
            E::NAME
        );
    }

    /// Runs `handler` for every delivered `E`. Registers `E` if needed.
    pub fn subscribe<E: NetEvent>(&mut self, mut handler: impl FnMut(&E) + Send + 'static) {
        self.register::<E>();
        let boxed: EventHandler = Box::new(move |event: &dyn Any| {
            if let Some(event) = event.downcast_ref::<E>() {
                handler(event);
            }
        });
        if let Some(route) = self.routes.get_mut(&E::KIND) {
            route.handlers.push(boxed);
        }
    }

    /// Returns true if an event message of this kind can be decoded.
    #[must_use]
    pub fn knows(&self, kind: u8) -> bool {
        self.routes.contains_key(&kind)
    }

    /// Forgets every remembered sequence. Routes and handlers stay.
    ///
    /// Sequences are per server run, so a new connection starts clean.
    pub fn reset_sequences(&mut self) {
        self.recent.clear();
    }

    /// Number of duplicate deliveries suppressed so far.
    #[must_use]
    pub const fn duplicates(&self) -> u64 {
        self.duplicates
    }

    /// Decodes an event message and runs its handlers once.
    ///
    /// # Errors
    ///
    /// Unregistered event kinds are unknown message kinds. Malformed payloads
    /// are protocol errors; handlers do not run.
    pub fn dispatch(&mut self, message: &[u8]) -> ProtocolResult<Dispatch> {
        let (kind, payload) = split_message(message)?;
        let MessageKind::Event(event_kind) = kind else {
            return Err(ProtocolError::UnexpectedMessage(kind.to_byte()));
        };
        let route = self
            .routes
            .get_mut(&event_kind)
            .ok_or(ProtocolError::UnknownMessageKind(kind.to_byte()))?;

        let mut reader = WireReader::new(payload);
        let sequence = reader.read_u32()?;
        let event = (route.decode)(&mut reader)?;
        reader.finish()?;

        if !self.recent.insert(sequence) {
            self.duplicates += 1;
            tracing::debug!(event = route.name, sequence, "duplicate event suppressed");
            return Ok(Dispatch::Duplicate);
        }

        for handler in &mut route.handlers {
            handler(event.as_ref());
        }
        Ok(Dispatch::Delivered)
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new(DEFAULT_DEDUP_WINDOW)
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("kinds", &self.routes.len())
            .field("recent", &self.recent.order.len())
            .field("duplicates", &self.duplicates)
            .finish()
    }
}
