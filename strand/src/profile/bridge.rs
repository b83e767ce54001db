//! Reconciles the sink's view of the call stack across context switches.

use super::{synthetic_extra, FrameId, ProfileEventKind, ProfileFrame, ProfileSink};
use crate::core::{ContextId, Value};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::Rc;

/// A frame plus the sink installation it was entered under.
#[derive(Debug, Clone)]
struct FrameRecord {
    frame: ProfileFrame,
    /// `None` when no sink was installed at entry.
    epoch: Option<u64>,
    /// Native callouts report `CCall`/`CReturn`.
    native: bool,
}

impl FrameRecord {
    fn call_kind(&self) -> ProfileEventKind {
        if self.native {
            ProfileEventKind::CCall
        } else {
            ProfileEventKind::Call
        }
    }

    fn return_kind(&self) -> ProfileEventKind {
        if self.native {
            ProfileEventKind::CReturn
        } else {
            ProfileEventKind::Return
        }
    }
}

/// One context's logical stack: what it inherited, then its own frames.
#[derive(Debug, Clone, Default)]
struct FrameChain {
    base: Vec<FrameRecord>,
    own: Vec<FrameRecord>,
}

impl FrameChain {
    fn full(&self) -> Vec<FrameRecord> {
        self.base.iter().chain(&self.own).cloned().collect()
    }
}

/// Profile events computed under the engine borrow, delivered after it.
#[must_use]
pub(crate) struct PendingProfile {
    sink: Option<Rc<dyn ProfileSink>>,
    events: Vec<(ProfileFrame, ProfileEventKind, Value)>,
}

impl PendingProfile {
    fn for_sink(sink: Option<Rc<dyn ProfileSink>>) -> Self {
        Self {
            sink,
            events: Vec::new(),
        }
    }

    pub(crate) fn none() -> Self {
        Self::for_sink(None)
    }

    fn push(&mut self, frame: &ProfileFrame, kind: ProfileEventKind, extra: Value) {
        if self.sink.is_some() {
            self.events.push((frame.clone(), kind, extra));
        }
    }

    #[cfg(test)]
    fn kinds(&self) -> Vec<(String, ProfileEventKind)> {
        self.events
            .iter()
            .map(|(frame, kind, _)| (frame.name.clone(), *kind))
            .collect()
    }

    pub(crate) fn deliver(self) {
        if let Some(sink) = self.sink {
            for (frame, kind, extra) in &self.events {
                sink.on_event(frame, *kind, extra);
            }
        }
    }
}

/// Per-engine profile state.
///
/// `visible` is exactly what the installed sink believes is on the stack:
/// the running context's chain, filtered to frames entered under the
/// current installation.
#[derive(Default)]
pub(crate) struct ProfileBridge {
    sink: Option<Rc<dyn ProfileSink>>,
    epoch: u64,
    next_frame: u64,
    visible: Vec<FrameRecord>,
    chains: HashMap<ContextId, FrameChain>,
}

impl ProfileBridge {
    pub(crate) fn sink(&self) -> Option<Rc<dyn ProfileSink>> {
        self.sink.clone()
    }

    fn eligible(&self, record: &FrameRecord) -> bool {
        self.sink.is_some() && record.epoch == Some(self.epoch)
    }

    /// Swaps the sink. The outgoing sink gets balancing returns for every
    /// frame it still believes is active; the new one starts empty.
    pub(crate) fn set_sink(
        &mut self,
        sink: Option<Rc<dyn ProfileSink>>,
    ) -> (Option<Rc<dyn ProfileSink>>, PendingProfile) {
        let mut pending = PendingProfile::for_sink(self.sink.clone());
        for record in self.visible.drain(..).rev() {
            pending.push(&record.frame, record.return_kind(), synthetic_extra());
        }
        self.epoch += 1;
        let previous = std::mem::replace(&mut self.sink, sink);
        (previous, pending)
    }

    /// Pushes a frame onto the running context's chain.
    pub(crate) fn enter(&mut self, context: ContextId, name: &str) -> (FrameId, PendingProfile) {
        self.push_frame(context, name, false)
    }

    /// Pushes a native callout onto the running context's chain.
    ///
    /// Callouts nest like any other frame, so a switch closes and reopens
    /// them with `CReturn`/`CCall`.
    pub(crate) fn enter_native(&mut self, context: ContextId, name: &str) -> (FrameId, PendingProfile) {
        self.push_frame(context, name, true)
    }

    fn push_frame(&mut self, context: ContextId, name: &str, native: bool) -> (FrameId, PendingProfile) {
        self.next_frame += 1;
        let record = FrameRecord {
            frame: ProfileFrame {
                id: FrameId::new(self.next_frame),
                name: name.to_string(),
            },
            epoch: self.sink.is_some().then_some(self.epoch),
            native,
        };
        let id = record.frame.id;

        let mut pending = PendingProfile::for_sink(self.sink.clone());
        if self.eligible(&record) {
            pending.push(&record.frame, record.call_kind(), Value::Null);
            self.visible.push(record.clone());
        }
        self.chains.entry(context).or_default().own.push(record);
        (id, pending)
    }

    /// Pops `frame` (and anything entered after it) from `context`'s chain.
    ///
    /// Chains that inherited a popped frame as their base lose it too, so a
    /// returned frame is never replayed.
    pub(crate) fn exit(&mut self, context: ContextId, frame: FrameId) -> PendingProfile {
        let mut popped = HashSet::new();
        if let Some(chain) = self.chains.get_mut(&context) {
            if let Some(pos) = chain.own.iter().position(|r| r.frame.id == frame) {
                popped.extend(chain.own.drain(pos..).map(|r| r.frame.id));
            }
        }
        if !popped.is_empty() {
            for chain in self.chains.values_mut() {
                if let Some(pos) = chain.base.iter().position(|r| popped.contains(&r.frame.id)) {
                    chain.base.truncate(pos);
                }
            }
        }

        let mut pending = PendingProfile::for_sink(self.sink.clone());
        if let Some(pos) = self.visible.iter().position(|r| r.frame.id == frame) {
            for record in self.visible.drain(pos..).rev() {
                let extra = if record.frame.id == frame {
                    Value::Null
                } else {
                    synthetic_extra()
                };
                pending.push(&record.frame, record.return_kind(), extra);
            }
        }
        pending
    }

    /// Moves the sink's view from `origin`'s chain to `target`'s.
    ///
    /// A context entered for the first time inherits `origin`'s full chain
    /// as its base.
    pub(crate) fn transfer(
        &mut self,
        origin: ContextId,
        target: ContextId,
        first_entry: bool,
    ) -> PendingProfile {
        if first_entry {
            let base = self
                .chains
                .get(&origin)
                .map(FrameChain::full)
                .unwrap_or_default();
            self.chains.insert(
                target,
                FrameChain {
                    base,
                    own: Vec::new(),
                },
            );
        }

        let incoming: Vec<FrameRecord> = self
            .chains
            .get(&target)
            .map(FrameChain::full)
            .unwrap_or_default()
            .into_iter()
            .filter(|record| self.eligible(record))
            .collect();

        let shared = self
            .visible
            .iter()
            .zip(&incoming)
            .take_while(|(a, b)| a.frame.id == b.frame.id)
            .count();

        let mut pending = PendingProfile::for_sink(self.sink.clone());
        for record in self.visible.drain(shared..).rev() {
            pending.push(&record.frame, record.return_kind(), synthetic_extra());
        }
        for record in &incoming[shared..] {
            pending.push(&record.frame, record.call_kind(), synthetic_extra());
        }
        self.visible = incoming;
        pending
    }

    /// Forgets a finished context's chain.
    pub(crate) fn release(&mut self, context: ContextId) {
        self.chains.remove(&context);
    }

    /// Drops the sink without notifying it.
    pub(crate) fn clear(&mut self) {
        self.sink = None;
        self.visible.clear();
        self.chains.clear();
    }
}

impl fmt::Debug for ProfileBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProfileBridge")
            .field("has_sink", &self.sink.is_some())
            .field("epoch", &self.epoch)
            .field("visible", &self.visible.len())
            .field("chains", &self.chains.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{is_synthetic, MockProfileSink};
    use pretty_assertions::assert_eq;
    use ProfileEventKind::{CCall, CReturn, Call, Return};

    const ROOT: ContextId = ContextId::ROOT;

    fn ctx(n: usize) -> ContextId {
        ContextId::from_index(n)
    }

    fn silent_sink() -> Rc<dyn ProfileSink> {
        Rc::new(|_: &ProfileFrame, _: ProfileEventKind, _: &Value| {})
    }

    fn installed() -> ProfileBridge {
        let mut bridge = ProfileBridge::default();
        let _ = bridge.set_sink(Some(silent_sink()));
        bridge
    }

    fn names(pairs: &[(&str, ProfileEventKind)]) -> Vec<(String, ProfileEventKind)> {
        pairs.iter().map(|(n, k)| ((*n).to_string(), *k)).collect()
    }

    #[test]
    fn test_enter_exit_without_sink_is_silent() {
        let mut bridge = ProfileBridge::default();
        let (id, pending) = bridge.enter(ROOT, "outer");
        assert!(pending.kinds().is_empty());
        assert!(bridge.exit(ROOT, id).kinds().is_empty());
    }

    #[test]
    fn test_enter_exit_with_sink() {
        let mut bridge = installed();
        let (outer, p1) = bridge.enter(ROOT, "outer");
        let (_inner, p2) = bridge.enter(ROOT, "inner");
        assert_eq!(p1.kinds(), names(&[("outer", Call)]));
        assert_eq!(p2.kinds(), names(&[("inner", Call)]));

        // Exiting the outer frame also pops the inner one, innermost first.
        let pending = bridge.exit(ROOT, outer);
        assert_eq!(pending.kinds(), names(&[("inner", Return), ("outer", Return)]));
        assert!(is_synthetic(&pending.events[0].2));
        assert!(!is_synthetic(&pending.events[1].2));
    }

    #[test]
    fn test_first_transfer_inherits_origin_chain() {
        let mut bridge = installed();
        let (_f, _) = bridge.enter(ROOT, "f");

        // The child shares f, so nothing is emitted.
        assert!(bridge.transfer(ROOT, ctx(1), true).kinds().is_empty());
        let (_g, p) = bridge.enter(ctx(1), "g");
        assert_eq!(p.kinds(), names(&[("g", Call)]));

        // Back to root: g is not shared.
        assert_eq!(bridge.transfer(ctx(1), ROOT, false).kinds(), names(&[("g", Return)]));
        // And in again.
        assert_eq!(bridge.transfer(ROOT, ctx(1), false).kinds(), names(&[("g", Call)]));
    }

    #[test]
    fn test_transfer_between_siblings() {
        let mut bridge = installed();
        let _ = bridge.transfer(ROOT, ctx(1), true);
        let (_a, _) = bridge.enter(ctx(1), "a");
        let _ = bridge.transfer(ctx(1), ROOT, false);
        let _ = bridge.transfer(ROOT, ctx(2), true);
        let (_b, _) = bridge.enter(ctx(2), "b");

        let pending = bridge.transfer(ctx(2), ctx(1), false);
        assert_eq!(pending.kinds(), names(&[("b", Return), ("a", Call)]));
        assert!(pending.events.iter().all(|(_, _, extra)| is_synthetic(extra)));
    }

    #[test]
    fn test_frames_entered_before_install_are_invisible() {
        let mut bridge = ProfileBridge::default();
        let (_early, _) = bridge.enter(ROOT, "early");
        let _ = bridge.set_sink(Some(silent_sink()));

        let (late, p) = bridge.enter(ROOT, "late");
        assert_eq!(p.kinds(), names(&[("late", Call)]));
        let _ = bridge.transfer(ROOT, ctx(1), true);
        assert!(bridge.transfer(ctx(1), ROOT, false).kinds().is_empty());
        assert_eq!(bridge.exit(ROOT, late).kinds(), names(&[("late", Return)]));
    }

    #[test]
    fn test_sink_swap_flushes_visible_frames() {
        let mut mock = MockProfileSink::new();
        mock.expect_on_event()
            .withf(|frame, kind, extra| {
                frame.name == "held" && *kind == Return && is_synthetic(extra)
            })
            .times(1)
            .return_const(());

        let mut bridge = ProfileBridge::default();
        let _ = bridge.set_sink(Some(Rc::new(mock)));
        let (held, p) = bridge.enter(ROOT, "held");
        // The Call went to the mock too; drop it undelivered.
        drop(p);

        let (previous, flush) = bridge.set_sink(None);
        assert!(previous.is_some());
        flush.deliver();

        // Removed sink: leaving the frame now reaches nobody.
        assert!(bridge.exit(ROOT, held).kinds().is_empty());
    }

    #[test]
    fn test_native_frames() {
        let mut bridge = installed();
        let (memcpy, p) = bridge.enter_native(ROOT, "memcpy");
        assert_eq!(p.kinds(), names(&[("memcpy", CCall)]));
        assert_eq!(bridge.exit(ROOT, memcpy).kinds(), names(&[("memcpy", CReturn)]));

        let _ = bridge.set_sink(None);
        let (untracked, p) = bridge.enter_native(ROOT, "x");
        assert!(p.kinds().is_empty());
        assert!(bridge.exit(ROOT, untracked).kinds().is_empty());
    }

    #[test]
    fn test_open_native_frame_follows_its_context() {
        let mut bridge = installed();
        let _ = bridge.transfer(ROOT, ctx(1), true);
        let (_run, _) = bridge.enter(ctx(1), "run");
        let (native, _) = bridge.enter_native(ctx(1), "n");

        // Switching out closes the callout before its enclosing frame.
        let out = bridge.transfer(ctx(1), ROOT, false);
        assert_eq!(out.kinds(), names(&[("n", CReturn), ("run", Return)]));
        let back = bridge.transfer(ROOT, ctx(1), false);
        assert_eq!(back.kinds(), names(&[("run", Call), ("n", CCall)]));
        assert!(back.events.iter().all(|(_, _, extra)| is_synthetic(extra)));

        assert_eq!(bridge.exit(ctx(1), native).kinds(), names(&[("n", CReturn)]));
    }

    #[test]
    fn test_returned_frames_leave_inherited_bases() {
        let mut bridge = installed();
        let (outer, _) = bridge.enter(ROOT, "outer");
        let _ = bridge.transfer(ROOT, ctx(1), true);
        let (_g, _) = bridge.enter(ctx(1), "g");
        let _ = bridge.transfer(ctx(1), ROOT, false);

        assert_eq!(bridge.exit(ROOT, outer).kinds(), names(&[("outer", Return)]));

        // outer already returned: only the child's own frame comes back.
        assert_eq!(bridge.transfer(ROOT, ctx(1), false).kinds(), names(&[("g", Call)]));
        assert_eq!(bridge.transfer(ctx(1), ROOT, false).kinds(), names(&[("g", Return)]));
    }
}
