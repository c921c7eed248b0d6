// In-memory queue algebra shared by the repository and the media session
//
// Every mutation leaves positions contiguous from zero and keeps the
// now-playing pointer on the same logical item where that item survives.

use crate::error::{Error, Result};

/// An ordered queue with an optional now-playing pointer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueList<T> {
    items: Vec<T>,
    now_playing: Option<usize>,
}

/// What happened to the now-playing pointer during a mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NowPlayingChange {
    /// Same logical item, possibly at a new index
    Kept,
    /// The playing item was removed and another one took over
    Replaced,
    /// Nothing is playing any more
    Cleared,
}

impl<T> Default for QueueList<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            now_playing: None,
        }
    }
}

impl<T> QueueList<T> {
    /// Build a queue; a pointer past the end is dropped
    pub fn new(items: Vec<T>, now_playing: Option<usize>) -> Self {
        let now_playing = now_playing.filter(|&i| i < items.len());
        Self { items, now_playing }
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn into_items(self) -> Vec<T> {
        self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn now_playing(&self) -> Option<usize> {
        self.now_playing
    }

    pub fn current(&self) -> Option<&T> {
        self.now_playing.and_then(|i| self.items.get(i))
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index < self.items.len() {
            Ok(())
        } else {
            Err(Error::InvalidQueueIndex {
                index,
                len: self.items.len(),
            })
        }
    }

    /// Point now-playing at `index`
    pub fn play(&mut self, index: usize) -> Result<()> {
        self.check_index(index)?;
        self.now_playing = Some(index);
        Ok(())
    }

    /// Append at the end; never changes what is playing
    pub fn push(&mut self, item: T) -> usize {
        self.items.push(item);
        self.items.len() - 1
    }

    /// Remove the item at `from` and reinsert it at `to` (list semantics, not swap)
    pub fn move_item(&mut self, from: usize, to: usize) -> Result<()> {
        self.check_index(from)?;
        self.check_index(to)?;
        if from == to {
            return Ok(());
        }

        let item = self.items.remove(from);
        self.items.insert(to, item);

        if let Some(current) = self.now_playing {
            self.now_playing = Some(if current == from {
                to
            } else if from < current && current <= to {
                current - 1
            } else if to <= current && current < from {
                current + 1
            } else {
                current
            });
        }
        Ok(())
    }

    /// Remove the given positions (duplicates ignored).
    ///
    /// If the playing item goes, the first surviving item after it takes over,
    /// then the last surviving item before it; an emptied queue plays nothing.
    pub fn remove_positions(&mut self, positions: &[usize]) -> Result<NowPlayingChange> {
        for &position in positions {
            self.check_index(position)?;
        }

        let mut removed = vec![false; self.items.len()];
        for &position in positions {
            removed[position] = true;
        }

        let old_current = self.now_playing;
        let mut kept = Vec::with_capacity(self.items.len());
        let mut new_index_of_old = vec![None; self.items.len()];
        for (old_index, item) in std::mem::take(&mut self.items).into_iter().enumerate() {
            if !removed[old_index] {
                new_index_of_old[old_index] = Some(kept.len());
                kept.push(item);
            }
        }
        self.items = kept;

        let Some(current) = old_current else {
            return Ok(NowPlayingChange::Kept);
        };

        if let Some(same) = new_index_of_old[current] {
            self.now_playing = Some(same);
            return Ok(NowPlayingChange::Kept);
        }

        let successor = new_index_of_old[current + 1..].iter().flatten().next().copied();
        let predecessor = new_index_of_old[..current].iter().flatten().last().copied();
        self.now_playing = successor.or(predecessor);

        Ok(match self.now_playing {
            Some(_) => NowPlayingChange::Replaced,
            None => NowPlayingChange::Cleared,
        })
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.now_playing = None;
    }

    /// Split at the now-playing pointer: the playing item and everything after it
    pub fn split_now_playing(&self) -> Option<(&T, &[T])> {
        let current = self.now_playing?;
        let (head, rest) = self.items[current..].split_first()?;
        Some((head, rest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn abcd(now_playing: Option<usize>) -> QueueList<char> {
        QueueList::new(vec!['A', 'B', 'C', 'D'], now_playing)
    }

    #[test]
    fn test_move_is_list_semantics_not_swap() {
        let mut queue = abcd(Some(0));
        queue.move_item(2, 1).unwrap();
        assert_eq!(queue.items(), &['A', 'C', 'B', 'D']);
        assert_eq!(queue.current(), Some(&'A'));
        assert_eq!(queue.now_playing(), Some(0));
    }

    #[test]
    fn test_move_follows_playing_item() {
        let mut queue = abcd(Some(1));
        queue.move_item(1, 3).unwrap();
        assert_eq!(queue.items(), &['A', 'C', 'D', 'B']);
        assert_eq!(queue.current(), Some(&'B'));

        let mut queue = abcd(Some(2));
        queue.move_item(3, 0).unwrap();
        assert_eq!(queue.items(), &['D', 'A', 'B', 'C']);
        assert_eq!(queue.current(), Some(&'C'));

        let mut queue = abcd(Some(2));
        queue.move_item(0, 3).unwrap();
        assert_eq!(queue.current(), Some(&'C'));
        assert_eq!(queue.now_playing(), Some(1));
    }

    #[test]
    fn test_move_out_of_range_fails_without_mutation() {
        let mut queue = abcd(Some(0));
        let err = queue.move_item(1, 4).unwrap_err();
        assert!(matches!(err, Error::InvalidQueueIndex { index: 4, len: 4 }));
        assert_eq!(queue, abcd(Some(0)));
    }

    #[test]
    fn test_remove_playing_item_moves_to_successor() {
        let mut queue = abcd(Some(1));
        let change = queue.remove_positions(&[1, 2]).unwrap();
        assert_eq!(queue.items(), &['A', 'D']);
        assert_eq!(change, NowPlayingChange::Replaced);
        assert_eq!(queue.current(), Some(&'D'));
        assert_eq!(queue.now_playing(), Some(1));
    }

    #[test]
    fn test_remove_playing_tail_falls_back_to_predecessor() {
        let mut queue = abcd(Some(3));
        let change = queue.remove_positions(&[2, 3]).unwrap();
        assert_eq!(change, NowPlayingChange::Replaced);
        assert_eq!(queue.current(), Some(&'B'));
    }

    #[test]
    fn test_remove_before_playing_shifts_pointer() {
        let mut queue = abcd(Some(3));
        let change = queue.remove_positions(&[0, 1]).unwrap();
        assert_eq!(change, NowPlayingChange::Kept);
        assert_eq!(queue.items(), &['C', 'D']);
        assert_eq!(queue.current(), Some(&'D'));
    }

    #[test]
    fn test_remove_everything_clears() {
        let mut queue = abcd(Some(2));
        let change = queue.remove_positions(&[3, 2, 1, 0, 2]).unwrap();
        assert_eq!(change, NowPlayingChange::Cleared);
        assert!(queue.is_empty());
        assert_eq!(queue.now_playing(), None);
        assert!(queue.split_now_playing().is_none());
    }

    #[test]
    fn test_remove_invalid_position_is_rejected() {
        let mut queue = abcd(None);
        assert!(queue.remove_positions(&[1, 9]).is_err());
        assert_eq!(queue.len(), 4);
    }

    #[test]
    fn test_split_now_playing() {
        let queue = abcd(Some(1));
        let (now, upcoming) = queue.split_now_playing().unwrap();
        assert_eq!(*now, 'B');
        assert_eq!(upcoming, &['C', 'D']);

        assert!(abcd(None).split_now_playing().is_none());
    }

    #[test]
    fn test_new_drops_dangling_pointer() {
        let queue = QueueList::new(vec!['A'], Some(4));
        assert_eq!(queue.now_playing(), None);
    }

    /// Item a removal hands now-playing to: the pointer itself if it survives,
    /// else the first survivor after it, else the last survivor before it
    fn expected_after_removal(
        before: &[u32],
        playing: Option<usize>,
        removed: &[bool],
    ) -> Option<u32> {
        let current = playing?;
        if !removed[current] {
            return Some(before[current]);
        }
        let after = (current + 1..before.len()).find(|&i| !removed[i]);
        let before_it = (0..current).rev().find(|&i| !removed[i]);
        after.or(before_it).map(|i| before[i])
    }

    #[test]
    fn test_random_mutations_keep_invariants() {
        use rand::rngs::StdRng;
        use rand::{Rng, SeedableRng};

        for seed in 0..64 {
            let mut rng = StdRng::seed_from_u64(seed);
            let start = rng.gen_range(0..10);
            let mut queue = QueueList::new((0..10).collect::<Vec<u32>>(), Some(start));
            let mut next_item = 10;

            for step in 0..40 {
                let before = queue.items().to_vec();
                let playing = queue.now_playing();
                let len = before.len();

                match rng.gen_range(0..4) {
                    0 => {
                        let from = rng.gen_range(0..=len);
                        let to = rng.gen_range(0..=len);
                        if from >= len || to >= len {
                            assert!(queue.move_item(from, to).is_err());
                            assert_eq!(queue.items(), &before[..]);
                            assert_eq!(queue.now_playing(), playing);
                        } else {
                            queue.move_item(from, to).unwrap();
                            let mut expected = before.clone();
                            let item = expected.remove(from);
                            expected.insert(to, item);
                            assert_eq!(queue.items(), &expected[..], "seed {seed} step {step}");
                            assert_eq!(queue.current(), playing.map(|i| &before[i]));
                        }
                    }
                    1 => {
                        let count = rng.gen_range(0..=len.min(3));
                        let positions: Vec<usize> =
                            (0..count).map(|_| rng.gen_range(0..len)).collect();
                        let mut removed = vec![false; len];
                        for &p in &positions {
                            removed[p] = true;
                        }

                        let change = queue.remove_positions(&positions).unwrap();
                        let expected: Vec<u32> = before
                            .iter()
                            .zip(&removed)
                            .filter(|(_, gone)| !**gone)
                            .map(|(&item, _)| item)
                            .collect();
                        assert_eq!(queue.items(), &expected[..], "seed {seed} step {step}");
                        let successor = expected_after_removal(&before, playing, &removed);
                        assert_eq!(queue.current().copied(), successor);
                        if successor.is_none() && playing.is_some() {
                            assert_eq!(change, NowPlayingChange::Cleared);
                            assert!(queue.is_empty());
                        }
                    }
                    2 => {
                        let position = queue.push(next_item);
                        next_item += 1;
                        assert_eq!(position, len);
                        assert_eq!(queue.current(), playing.map(|i| &before[i]));
                    }
                    _ => {
                        let index = rng.gen_range(0..=len);
                        if index < len {
                            queue.play(index).unwrap();
                            assert_eq!(queue.current(), Some(&before[index]));
                        } else {
                            assert!(queue.play(index).is_err());
                            assert_eq!(queue.now_playing(), playing);
                        }
                    }
                }

                // Unique items at contiguous indices, pointer in bounds
                let mut seen = queue.items().to_vec();
                seen.sort_unstable();
                seen.dedup();
                assert_eq!(seen.len(), queue.len());
                assert!(queue.now_playing().map_or(true, |i| i < queue.len()));
            }
        }
    }
}
