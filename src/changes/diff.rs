//! Line-oriented diff used to score content changes.

/// Largest LCS table (rows x columns) computed before falling back to a
/// whole-block replacement of the differing middle section.
const MAX_TABLE_CELLS: usize = 4_000_000;

/// Unchanged lines kept around each hunk
const CONTEXT_LINES: usize = 3;

/// Unified-diff lines preserved on a change event
pub const MAX_DIFF_LINES: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Equal,
    Removed,
    Added,
}

/// Summary of the difference between two texts
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LineDiff {
    pub added: usize,
    pub removed: usize,
    pub old_line_count: usize,
    /// Unified-diff hunks, truncated to [`MAX_DIFF_LINES`]
    pub lines: Vec<String>,
}

impl LineDiff {
    /// `(added + removed) / max(1, old lines) * 100`, clamped to `[0, 100]`
    /// and rounded to two decimals
    pub fn change_percent(&self) -> f64 {
        let raw = (self.added + self.removed) as f64 / self.old_line_count.max(1) as f64 * 100.0;
        (raw.clamp(0.0, 100.0) * 100.0).round() / 100.0
    }
}

/// Split text into lines for diffing; empty text has no lines
pub fn split_lines(text: &str) -> Vec<&str> {
    if text.is_empty() {
        Vec::new()
    } else {
        text.lines().collect()
    }
}

/// Diff two texts line by line
pub fn diff_text(old: &str, new: &str) -> LineDiff {
    diff_lines(&split_lines(old), &split_lines(new))
}

pub fn diff_lines(old: &[&str], new: &[&str]) -> LineDiff {
    let ops = edit_script(old, new);
    let added = ops.iter().filter(|op| **op == Op::Added).count();
    let removed = ops.iter().filter(|op| **op == Op::Removed).count();

    LineDiff {
        added,
        removed,
        old_line_count: old.len(),
        lines: unified(&ops, old, new),
    }
}

fn edit_script(old: &[&str], new: &[&str]) -> Vec<Op> {
    let prefix = old.iter().zip(new).take_while(|(a, b)| a == b).count();
    let suffix = old[prefix..]
        .iter()
        .rev()
        .zip(new[prefix..].iter().rev())
        .take_while(|(a, b)| a == b)
        .count();

    let old_mid = &old[prefix..old.len() - suffix];
    let new_mid = &new[prefix..new.len() - suffix];

    let mut ops = vec![Op::Equal; prefix];
    if old_mid.len().saturating_mul(new_mid.len()) > MAX_TABLE_CELLS {
        ops.extend(std::iter::repeat_n(Op::Removed, old_mid.len()));
        ops.extend(std::iter::repeat_n(Op::Added, new_mid.len()));
    } else {
        ops.extend(lcs_ops(old_mid, new_mid));
    }
    ops.extend(std::iter::repeat_n(Op::Equal, suffix));
    ops
}

fn lcs_ops(old: &[&str], new: &[&str]) -> Vec<Op> {
    let (n, m) = (old.len(), new.len());
    // table[i][j] = LCS length of old[i..] and new[j..]
    let mut table = vec![vec![0u32; m + 1]; n + 1];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            table[i][j] = if old[i] == new[j] {
                table[i + 1][j + 1] + 1
            } else {
                table[i + 1][j].max(table[i][j + 1])
            };
        }
    }

    let mut ops = Vec::with_capacity(n + m);
    let (mut i, mut j) = (0, 0);
    while i < n && j < m {
        if old[i] == new[j] {
            ops.push(Op::Equal);
            i += 1;
            j += 1;
        } else if table[i + 1][j] >= table[i][j + 1] {
            ops.push(Op::Removed);
            i += 1;
        } else {
            ops.push(Op::Added);
            j += 1;
        }
    }
    ops.extend(std::iter::repeat_n(Op::Removed, n - i));
    ops.extend(std::iter::repeat_n(Op::Added, m - j));
    ops
}

/// Render an edit script as unified-diff hunks
fn unified(ops: &[Op], old: &[&str], new: &[&str]) -> Vec<String> {
    // Positions in old/new before each op
    let mut positions = Vec::with_capacity(ops.len());
    let (mut i, mut j) = (0usize, 0usize);
    for op in ops {
        positions.push((i, j));
        match op {
            Op::Equal => {
                i += 1;
                j += 1;
            }
            Op::Removed => i += 1,
            Op::Added => j += 1,
        }
    }

    let changed: Vec<usize> = ops
        .iter()
        .enumerate()
        .filter(|(_, op)| **op != Op::Equal)
        .map(|(idx, _)| idx)
        .collect();

    // Group changes whose context windows touch
    let mut ranges: Vec<(usize, usize)> = Vec::new();
    for idx in changed {
        let start = idx.saturating_sub(CONTEXT_LINES);
        let end = (idx + CONTEXT_LINES + 1).min(ops.len());
        match ranges.last_mut() {
            Some(last) if start <= last.1 => last.1 = end,
            _ => ranges.push((start, end)),
        }
    }

    let mut out = Vec::new();
    for (start, end) in ranges {
        let (old_start, new_start) = positions[start];
        let old_len = ops[start..end].iter().filter(|op| **op != Op::Added).count();
        let new_len = ops[start..end].iter().filter(|op| **op != Op::Removed).count();
        out.push(format!(
            "@@ -{} +{} @@",
            hunk_range(old_start, old_len),
            hunk_range(new_start, new_len)
        ));

        for idx in start..end {
            let (oi, nj) = positions[idx];
            out.push(match ops[idx] {
                Op::Equal => format!(" {}", old[oi]),
                Op::Removed => format!("-{}", old[oi]),
                Op::Added => format!("+{}", new[nj]),
            });
        }

        if out.len() >= MAX_DIFF_LINES {
            out.truncate(MAX_DIFF_LINES);
            break;
        }
    }
    out
}

fn hunk_range(start: usize, len: usize) -> String {
    match len {
        0 => format!("{start},0"),
        1 => format!("{}", start + 1),
        _ => format!("{},{}", start + 1, len),
    }
}
