use rustc_hash::FxHashSet;

use super::{END_OF_INPUT, EPSILON, Grammar, SymbolSet};

/// How a FIRST computation ended, which tells the caller whether to keep
/// walking the alternative it is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirstStatus {
    /// A terminal was produced; the walk stops.
    Terminal,
    /// Nothing usable: end of input, unknown symbol, or a symbol already in
    /// progress higher up the recursion.
    NonTerminal,
    /// The symbol derives the empty string; the walk continues.
    Epsilon,
}

/// Symbol occurrence: rule key, alternative index, position.
type Occurrence<'g> = (&'g str, usize, usize);

pub fn first_of(grammar: &Grammar, symbol: &str) -> (SymbolSet, FirstStatus) {
    let mut in_progress = FxHashSet::default();
    first_guarded(grammar, symbol, &mut in_progress)
}

fn first_guarded<'g>(
    grammar: &'g Grammar,
    symbol: &str,
    in_progress: &mut FxHashSet<Occurrence<'g>>,
) -> (SymbolSet, FirstStatus) {
    if grammar.is_terminal(symbol) {
        if symbol == END_OF_INPUT {
            return (SymbolSet::new(), FirstStatus::NonTerminal);
        }
        let status = if symbol == EPSILON {
            FirstStatus::Epsilon
        } else {
            FirstStatus::Terminal
        };
        return (SymbolSet::from([symbol.to_string()]), status);
    }

    let Some((key, alternatives)) = grammar.rules().find(|(key, _)| *key == symbol) else {
        return (SymbolSet::new(), FirstStatus::NonTerminal);
    };

    let mut set = SymbolSet::new();
    let mut nullable = false;
    for (alternative_index, alternative) in alternatives.iter().enumerate() {
        let body = match alternative.split_last() {
            Some((last, rest)) if last == END_OF_INPUT => rest,
            _ => alternative.as_slice(),
        };

        let mut epsilon_count = 0;
        for (position, next) in body.iter().enumerate() {
            let occurrence = (key, alternative_index, position);
            if !in_progress.insert(occurrence) {
                break;
            }
            let (next_set, status) = first_guarded(grammar, next, in_progress);
            in_progress.remove(&occurrence);

            set.extend(next_set);
            match status {
                FirstStatus::Epsilon => epsilon_count += 1,
                FirstStatus::Terminal => {
                    epsilon_count = 0;
                    break;
                }
                FirstStatus::NonTerminal => break,
            }
        }
        if !body.is_empty() && epsilon_count == body.len() {
            nullable = true;
        }
    }

    if nullable {
        set.insert(EPSILON.to_string());
        (set, FirstStatus::Epsilon)
    } else {
        set.remove(EPSILON);
        let status = if set.is_empty() {
            FirstStatus::NonTerminal
        } else {
            FirstStatus::Terminal
        };
        (set, status)
    }
}

pub fn follow_of(grammar: &Grammar, symbol: &str) -> SymbolSet {
    let mut visited = FxHashSet::default();
    follow_guarded(grammar, symbol, &mut visited)
}

fn follow_guarded<'g>(
    grammar: &'g Grammar,
    symbol: &str,
    visited: &mut FxHashSet<(&'g str, usize)>,
) -> SymbolSet {
    let mut set = SymbolSet::new();
    if grammar.start_symbol() == Some(symbol) {
        set.insert(END_OF_INPUT.to_string());
    }

    for (key, alternatives) in grammar.rules() {
        for (alternative_index, alternative) in alternatives.iter().enumerate() {
            for (position, current) in alternative.iter().enumerate() {
                if current != symbol {
                    continue;
                }

                let mut reached_end = true;
                for next in &alternative[position + 1..] {
                    // `$` closes the start symbol, so whatever follows the
                    // start symbol also follows this occurrence.
                    if next == END_OF_INPUT {
                        set.insert(END_OF_INPUT.to_string());
                        continue;
                    }
                    let (next_set, status) = first_of(grammar, next);
                    set.extend(next_set.into_iter().filter(|member| member != EPSILON));
                    if status != FirstStatus::Epsilon {
                        reached_end = false;
                        break;
                    }
                }

                if reached_end && key != symbol && visited.insert((key, alternative_index)) {
                    set.extend(follow_guarded(grammar, key, visited));
                }
            }
        }
    }
    set
}
