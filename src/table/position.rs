/// Fixed point a table position is measured from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bookmark {
    Beginning,
    Current,
    End,
}

/// A position request: a bookmark, optionally narrowed to a fraction of the
/// table, moved by `delta` rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub origin: Bookmark,
    /// `(numerator, denominator)` of an approximate position. Only honoured
    /// from [`Bookmark::Current`].
    pub fraction: Option<(u32, u32)>,
    pub delta: i64,
}

impl Position {
    pub fn at(origin: Bookmark) -> Self {
        Self {
            origin,
            fraction: None,
            delta: 0,
        }
    }

    pub fn moved(self, delta: i64) -> Self {
        Self { delta, ..self }
    }
}

/// The row a position request lands on, clipped to the rows of the table.
/// `End` is the last row, not one past it.
pub fn position_in_table(row_count: u32, current: u32, position: &Position) -> u32 {
    let Some(last) = row_count.checked_sub(1) else {
        return 0;
    };
    let base = match (position.origin, position.fraction) {
        (Bookmark::Beginning, _) => 0,
        (Bookmark::End, _) => last,
        (Bookmark::Current, Some((numerator, total))) if total > 0 => {
            let scaled = u64::from(numerator) * u64::from(last) / u64::from(total);
            u32::try_from(scaled).unwrap_or(last)
        }
        (Bookmark::Current, _) => current,
    };
    let moved = i64::from(base).saturating_add(position.delta);
    u32::try_from(moved.clamp(0, i64::from(last))).unwrap_or(last)
}

#[cfg(test)]
mod tests {
    use rstest::*;

    use super::*;

    #[rstest]
    #[case::beginning(Position::at(Bookmark::Beginning), 0)]
    #[case::end_is_last_row(Position::at(Bookmark::End), 9)]
    #[case::current(Position::at(Bookmark::Current), 4)]
    #[case::forward(Position::at(Bookmark::Current).moved(3), 7)]
    #[case::past_the_end(Position::at(Bookmark::Current).moved(40), 9)]
    #[case::before_the_start(Position::at(Bookmark::End).moved(-40), 0)]
    #[case::huge_delta(Position::at(Bookmark::End).moved(i64::MAX), 9)]
    fn test_position_is_clipped(#[case] position: Position, #[case] expected: u32) {
        assert_eq!(position_in_table(10, 4, &position), expected);
    }

    #[rstest]
    #[case((3, 10), 2)]
    #[case((0, 10), 0)]
    #[case((10, 10), 9)]
    #[case((1, 2), 4)]
    fn test_fraction_scales_to_last_row(#[case] fraction: (u32, u32), #[case] expected: u32) {
        let position = Position {
            origin: Bookmark::Current,
            fraction: Some(fraction),
            delta: 0,
        };
        assert_eq!(position_in_table(10, 7, &position), expected);
    }

    #[rstest]
    fn test_empty_table_is_always_at_zero() {
        assert_eq!(
            position_in_table(0, 3, &Position::at(Bookmark::End).moved(5)),
            0
        );
    }
}
