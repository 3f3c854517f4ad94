//! Key dispatch and filtering: routes a driver key
//! event to the first admitting connection along the focus path, buffers
//! it if nobody is blocked waiting, and synthesizes auto-repeat.

use std::time::{Duration, Instant};

use tracing::warn;

use bap_protocol::keycode::KeyCode;

use crate::connection::ConnectionRegistry;
use crate::tty::TtyTree;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// `code` was appended to this connection's event buffer (and its
    /// reader, if blocked, was woken via `key_ready`).
    Delivered(u64),
    /// The connection's event buffer was full; the oldest entry was
    /// dropped to make room.
    DeliveredWithDrop(u64),
    /// No connection along the focus path admitted the code; it falls
    /// through to the server's built-in command processor.
    Unclaimed,
}

/// Routes one driver key event: walks connections in path order and hands
/// it to the first connection whose filter admits the code.
pub fn dispatch_key(tree: &TtyTree, registry: &mut ConnectionRegistry, code: KeyCode) -> DispatchOutcome {
    for handle in tree.focus_descent_path() {
        let candidates: Vec<u64> = tree.connections_at(handle).to_vec();
        for conn_id in candidates {
            let Some(conn) = registry.get_mut(conn_id) else { continue };
            if !conn.filter.admits(code) {
                continue;
            }
            let dropped = conn.events.push(code);
            conn.key_ready.notify_one();
            if dropped {
                warn!(connection = conn_id, "key event buffer full, oldest event dropped");
                return DispatchOutcome::DeliveredWithDrop(conn_id);
            }
            return DispatchOutcome::Delivered(conn_id);
        }
    }
    DispatchOutcome::Unclaimed
}

/// Call on every driver key event to maintain auto-repeat bookkeeping.
/// A driver in this implementation reports only "a key arrived",
/// not a separate release transition, so repeat is bounded the way the
/// spec's "arrival of any other key" clause allows: a different code
/// arriving cancels the pending repeat of the previous one. Explicit
/// release is modeled by [`cancel_repeat`] for drivers that do expose it.
pub fn note_key_arrival(conn: &mut crate::connection::Connection, code: KeyCode, now: Instant) {
    let ar = &mut conn.auto_repeat;
    if ar.down_code != Some(code) {
        ar.down_code = Some(code);
        ar.down_since = Some(now);
        ar.last_repeat = None;
    }
}

/// Cancels any pending repeat, e.g. on an explicit key-up transition.
pub fn cancel_repeat(conn: &mut crate::connection::Connection) {
    let ar = &mut conn.auto_repeat;
    ar.down_code = None;
    ar.down_since = None;
    ar.last_repeat = None;
}

/// If this connection is due for a synthesized repeat of its held-down key
/// at `now`, returns the code to redeliver and advances `last_repeat`.
pub fn due_repeat(conn: &mut crate::connection::Connection, now: Instant) -> Option<KeyCode> {
    let ar = &mut conn.auto_repeat;
    if !ar.enabled {
        return None;
    }
    let code = ar.down_code?;
    let since = ar.down_since?;
    let threshold = match ar.last_repeat {
        Some(last) => last + Duration::from_millis(ar.interval_ms),
        None => since + Duration::from_millis(ar.delay_ms),
    };
    if now < threshold {
        return None;
    }
    ar.last_repeat = Some(now);
    Some(code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Connection;
    use bap_protocol::keyrange::{Disposition, KeyRange};

    fn code(arg: u16) -> KeyCode {
        KeyCode::command(1, arg, 0)
    }

    #[test]
    fn first_admitting_connection_along_path_wins() {
        let mut tree = TtyTree::new();
        let leaf = tree.locate_or_create(&[1]);
        tree.set_focus(crate::tty::ROOT, 1);

        let mut registry = ConnectionRegistry::new(8);
        let ignorer = registry.insert(|id| Connection::new(id, 4, 1, "ignorer".into()));
        let acceptor = registry.insert(|id| Connection::new(id, 4, 1, "acceptor".into()));
        tree.attach(leaf, ignorer);
        tree.attach(leaf, acceptor);

        let c = code(7);
        registry.get_mut(ignorer).unwrap().filter.add(KeyRange::single(c), Disposition::Ignore);

        let outcome = dispatch_key(&tree, &mut registry, c);
        assert_eq!(outcome, DispatchOutcome::Delivered(acceptor));
        assert_eq!(registry.get_mut(acceptor).unwrap().events.pop(), Some(c));
    }

    #[test]
    fn unclaimed_when_nobody_admits() {
        let mut tree = TtyTree::new();
        let leaf = tree.locate_or_create(&[1]);
        tree.set_focus(crate::tty::ROOT, 1);
        let mut registry = ConnectionRegistry::new(8);
        let id = registry.insert(|id| Connection::new(id, 4, 1, "c".into()));
        tree.attach(leaf, id);
        let c = code(1);
        registry.get_mut(id).unwrap().filter.add(KeyRange::single(c), Disposition::Ignore);
        assert_eq!(dispatch_key(&tree, &mut registry, c), DispatchOutcome::Unclaimed);
    }

    #[test]
    fn repeat_fires_after_delay_then_at_interval() {
        let mut conn = Connection::new(1, 4, 1, "c".into());
        conn.auto_repeat.enabled = true;
        conn.auto_repeat.delay_ms = 100;
        conn.auto_repeat.interval_ms = 20;
        let t0 = Instant::now();
        let c = code(3);

        note_key_arrival(&mut conn, c, t0);
        assert_eq!(due_repeat(&mut conn, t0 + Duration::from_millis(50)), None);
        assert_eq!(due_repeat(&mut conn, t0 + Duration::from_millis(150)), Some(c));
        assert_eq!(due_repeat(&mut conn, t0 + Duration::from_millis(160)), None);
        assert_eq!(due_repeat(&mut conn, t0 + Duration::from_millis(171)), Some(c));
    }

    #[test]
    fn other_key_arrival_cancels_repeat() {
        let mut conn = Connection::new(1, 4, 1, "c".into());
        conn.auto_repeat.enabled = true;
        conn.auto_repeat.delay_ms = 10;
        let t0 = Instant::now();
        note_key_arrival(&mut conn, code(1), t0);
        note_key_arrival(&mut conn, code(2), t0 + Duration::from_millis(5));
        assert_eq!(conn.auto_repeat.down_code, Some(code(2)));
        assert_eq!(due_repeat(&mut conn, t0 + Duration::from_millis(100)), Some(code(2)));
    }

    #[test]
    fn cancel_repeat_clears_state() {
        let mut conn = Connection::new(1, 4, 1, "c".into());
        conn.auto_repeat.enabled = true;
        note_key_arrival(&mut conn, code(1), Instant::now());
        cancel_repeat(&mut conn);
        assert!(conn.auto_repeat.down_code.is_none());
    }
}
