//! The write arbiter: decides whose buffer is shown,
//! diffs it against the last frame sent to the driver, and flushes only the
//! changed range unless told to bypass that with `force`.

use crate::buffer::Freshness;
use crate::connection::ConnectionRegistry;
use crate::driver::{Cell, DriverPort};
use crate::error::Result;
use crate::tty::TtyTree;

pub struct Arbiter {
    last_frame: Vec<Cell>,
    has_last_frame: bool,
}

impl Arbiter {
    pub fn new(display_len: usize) -> Self {
        Arbiter { last_frame: vec![0; display_len], has_last_frame: false }
    }

    /// Finds the filling client by focus descent, diffs its buffer
    /// against the last frame, and pushes the changed range to the driver.
    /// `force` bypasses the diff (used on ownership/focus transfer) and
    /// writes the whole buffer. Returns the id of the connection that was
    /// displayed, if any.
    pub async fn refresh(
        &mut self,
        tree: &TtyTree,
        registry: &mut ConnectionRegistry,
        driver: &dyn DriverPort,
        force: bool,
    ) -> Result<Option<u64>> {
        let filling = self.find_filling_connection(tree, registry);
        let Some(conn_id) = filling else {
            return Ok(None);
        };
        let conn = registry.get_mut(conn_id).expect("filling connection vanished mid-refresh");
        let cells = conn.buffer.cells().to_vec();

        let range = if force || !self.has_last_frame {
            Some((0, cells.len()))
        } else {
            diff_range(&self.last_frame, &cells)
        };

        if let Some((begin, end)) = range {
            driver.write_cells(begin as u32, &cells[begin..end]).await?;
        }

        conn.buffer.mark_displayed();
        self.last_frame = cells;
        self.has_last_frame = true;
        Ok(Some(conn_id))
    }

    fn find_filling_connection(&self, tree: &TtyTree, registry: &ConnectionRegistry) -> Option<u64> {
        for handle in tree.focus_descent_path() {
            for &conn_id in tree.connections_at(handle) {
                if let Some(conn) = registry.get(conn_id) {
                    if conn.buffer.freshness() == Freshness::ToDisplay {
                        return Some(conn_id);
                    }
                }
            }
        }
        None
    }
}

/// Smallest `[begin, end)` range containing every index where `old` and
/// `new` differ, or `None` if they are identical.
fn diff_range(old: &[Cell], new: &[Cell]) -> Option<(usize, usize)> {
    let begin = old.iter().zip(new).position(|(a, b)| a != b)?;
    let end = old.iter().zip(new).rposition(|(a, b)| a != b)? + 1;
    Some((begin, end))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diff_range_finds_minimal_span() {
        let old = [0u8, 0, 0, 0, 0];
        let new = [0u8, 5, 0, 9, 0];
        assert_eq!(diff_range(&old, &new), Some((1, 4)));
    }

    #[test]
    fn diff_range_is_none_when_identical() {
        let a = [1u8, 2, 3];
        assert_eq!(diff_range(&a, &a), None);
    }

    #[tokio::test]
    async fn refresh_picks_first_to_display_connection_along_focus_path() {
        use crate::connection::Connection;
        use crate::driver::{DisplaySize, MockDriver};
        use crate::tty;

        let mut tree = tty::TtyTree::new();
        let leaf = tree.locate_or_create(&[1]);
        tree.set_focus(tty::ROOT, 1);

        let mut registry = ConnectionRegistry::new(8);
        let id = registry.insert(|id| Connection::new(id, 4, 1, "test".into()));
        tree.attach(leaf, id);
        registry
            .get_mut(id)
            .unwrap()
            .buffer
            .write_region(0, 4, None, None, Some(&[1, 2, 3, 4]), None)
            .unwrap();

        let driver = MockDriver::new(DisplaySize { width: 4, height: 1 }, false);
        let mut arbiter = Arbiter::new(4);
        let shown = arbiter.refresh(&tree, &mut registry, &driver, false).await.unwrap();
        assert_eq!(shown, Some(id));
        assert_eq!(driver.written_cells().await, vec![1, 2, 3, 4]);
    }
}
