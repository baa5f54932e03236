// Suffix array construction (qsufsort, Larsson & Sadakane).
//
// Two arrays of N+1 signed indices are used while sorting:
//   - `sa`:   suffix start positions, ordered by the prefix compared so far.
//             A negative entry -L marks a run of L fully sorted positions.
//   - `rank`: for every suffix, the index of the last slot of its group.
//
// Each doubling pass refines groups that share their first `h` bytes by the
// rank of the suffix `h` bytes further on.  The empty suffix (index N) has
// rank 0 and always sorts first.

use std::cmp::Ordering;

/// Groups below this size are refined by a selection pass instead of a
/// three-way partition.
const SMALL_GROUP: usize = 16;

/// Sorted suffixes of one old-file buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuffixArray {
    indices: Vec<isize>,
}

impl SuffixArray {
    /// Build the suffix array of `old`.
    ///
    /// # Panics
    ///
    /// Panics if `old` is too large for signed indices. No allocation can
    /// hold such a buffer, so this only fires on a broken caller.
    pub fn build(old: &[u8]) -> Self {
        assert!(
            old.len() < isize::MAX as usize,
            "old buffer of {} bytes exceeds the suffix index range",
            old.len()
        );
        let mut sa = vec![0isize; old.len() + 1];
        let mut rank = vec![0isize; old.len() + 1];
        qsufsort(&mut sa, &mut rank, old);
        Self { indices: sa }
    }

    /// Number of suffixes, including the empty sentinel suffix.
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    /// Always false: the sentinel suffix is present even for an empty buffer.
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Start position of the suffix at sorted position `i`.
    #[inline]
    pub fn get(&self, i: usize) -> usize {
        self.indices[i] as usize
    }

    /// Suffix start positions in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.indices.iter().map(|&i| i as usize)
    }

    /// Find the old position sharing the longest prefix with `new`.
    ///
    /// Binary search over the sorted suffixes; the two candidates left at
    /// the end are compared and the later one wins ties. Returns
    /// `(position, match_length)`.
    pub fn longest_match(&self, old: &[u8], new: &[u8]) -> (usize, usize) {
        let mut st = 0usize;
        let mut en = self.indices.len() - 1;
        while en - st >= 2 {
            let mid = st + (en - st) / 2;
            let suffix = &old[self.get(mid)..];
            let n = suffix.len().min(new.len());
            if suffix[..n] < new[..n] {
                st = mid;
            } else {
                en = mid;
            }
        }

        let (a, b) = (self.get(st), self.get(en));
        let x = match_len(&old[a..], new);
        let y = match_len(&old[b..], new);
        if x > y { (a, x) } else { (b, y) }
    }
}

/// Length of the common prefix of two slices.
#[inline]
pub fn match_len(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b).take_while(|(x, y)| x == y).count()
}

// ---------------------------------------------------------------------------
// Sorting
// ---------------------------------------------------------------------------

fn qsufsort(sa: &mut [isize], rank: &mut [isize], old: &[u8]) {
    let n = old.len();

    // Bucket by first byte. After the shift, buckets[b] is the number of
    // bytes smaller than b; slot 0 is reserved for the empty suffix.
    let mut buckets = [0isize; 256];
    for &b in old {
        buckets[b as usize] += 1;
    }
    for i in 1..256 {
        buckets[i] += buckets[i - 1];
    }
    for i in (1..256).rev() {
        buckets[i] = buckets[i - 1];
    }
    buckets[0] = 0;

    for (i, &b) in old.iter().enumerate() {
        buckets[b as usize] += 1;
        sa[buckets[b as usize] as usize] = i as isize;
    }
    sa[0] = n as isize;
    for (i, &b) in old.iter().enumerate() {
        rank[i] = buckets[b as usize];
    }
    rank[n] = 0;

    for i in 1..256 {
        if buckets[i] == buckets[i - 1] + 1 {
            sa[buckets[i] as usize] = -1;
        }
    }
    sa[0] = -1;

    let total = n as isize + 1;
    let mut pending = Vec::new();
    let mut h = 1usize;
    while sa[0] != -total {
        let mut run = 0isize;
        let mut i = 0isize;
        while i < total {
            let v = sa[i as usize];
            if v < 0 {
                run -= v;
                i -= v;
            } else {
                if run != 0 {
                    sa[(i - run) as usize] = -run;
                }
                let len = rank[v as usize] + 1 - i;
                split(sa, rank, &mut pending, i as usize, len as usize, h);
                i += len;
                run = 0;
            }
        }
        if run != 0 {
            sa[(i - run) as usize] = -run;
        }
        h += h;
    }

    for (i, &r) in rank.iter().enumerate() {
        sa[r as usize] = i as isize;
    }
}

/// Refine the group `sa[start..start + len]` by the rank `h` bytes ahead.
///
/// Sub-groups get their final group rank as soon as they are partitioned,
/// so every range still waiting on the stack carries a rank consistent with
/// suffix order and the stack can be drained in any order. `pending` is
/// scratch space shared across calls and is empty on return.
fn split(
    sa: &mut [isize],
    rank: &mut [isize],
    pending: &mut Vec<(usize, usize)>,
    start: usize,
    len: usize,
    h: usize,
) {
    pending.push((start, len));

    while let Some((start, len)) = pending.pop() {
        if len < SMALL_GROUP {
            select_small(sa, rank, start, len, h);
            continue;
        }

        let end = start + len;
        let pivot = rank[sa[start + len / 2] as usize + h];

        let mut less = 0;
        let mut equal = 0;
        for &s in &sa[start..end] {
            match rank[s as usize + h].cmp(&pivot) {
                Ordering::Less => less += 1,
                Ordering::Equal => equal += 1,
                Ordering::Greater => {}
            }
        }
        let jj = start + less;
        let kk = jj + equal;

        let (mut i, mut j, mut k) = (start, 0, 0);
        while i < jj {
            match rank[sa[i] as usize + h].cmp(&pivot) {
                Ordering::Less => i += 1,
                Ordering::Equal => {
                    sa.swap(i, jj + j);
                    j += 1;
                }
                Ordering::Greater => {
                    sa.swap(i, kk + k);
                    k += 1;
                }
            }
        }
        while jj + j < kk {
            if rank[sa[jj + j] as usize + h] == pivot {
                j += 1;
            } else {
                sa.swap(jj + j, kk + k);
                k += 1;
            }
        }

        for i in start..jj {
            rank[sa[i] as usize] = jj as isize - 1;
        }
        for i in jj..kk {
            rank[sa[i] as usize] = kk as isize - 1;
        }
        if jj + 1 == kk {
            sa[jj] = -1;
        }

        if end > kk {
            pending.push((kk, end - kk));
        }
        if jj > start {
            pending.push((start, jj - start));
        }
    }
}

/// Selection pass for small groups: repeatedly pull the minimum key run to
/// the front and rank it.
fn select_small(sa: &mut [isize], rank: &mut [isize], start: usize, len: usize, h: usize) {
    let end = start + len;
    let mut k = start;
    while k < end {
        let mut j = 1;
        let mut x = rank[sa[k] as usize + h];
        for i in 1..end - k {
            let v = rank[sa[k + i] as usize + h];
            if v < x {
                x = v;
                j = 0;
            }
            if v == x {
                sa.swap(k + j, k + i);
                j += 1;
            }
        }
        for i in 0..j {
            rank[sa[k + i] as usize] = (k + j) as isize - 1;
        }
        if j == 1 {
            sa[k] = -1;
        }
        k += j;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
