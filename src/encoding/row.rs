//! # Row Codec
//!
//! Rows are opaque to the version machinery; this codec only exists so
//! column-grouped tiers can split and merge them.
//!
//! ```text
//! +-------------+------------------+---------+------------------+---------+
//! | column_count| len+1 (col 0)    | bytes   | len+1 (col 1)    | bytes   | ...
//! |   varint    |   varint, 0=NULL |         |   varint, 0=NULL |         |
//! +-------------+------------------+---------+------------------+---------+
//! ```
//!
//! A column-group payload is a full-width row with the columns outside the
//! group encoded as NULL, so every group decodes with the same column
//! numbering and merging is column-wise "first non-NULL wins".

use eyre::{ensure, Result};

use super::varint::{get_varint, put_varint, varint_len};

pub type Column = Option<Vec<u8>>;

pub fn encode_row(columns: &[Option<&[u8]>]) -> Vec<u8> {
    let size = varint_len(columns.len() as u64)
        + columns
            .iter()
            .map(|c| c.map_or(1, |b| varint_len(b.len() as u64 + 1) + b.len()))
            .sum::<usize>();
    let mut out = Vec::with_capacity(size);
    put_varint(&mut out, columns.len() as u64);
    for column in columns {
        match column {
            None => put_varint(&mut out, 0),
            Some(bytes) => {
                put_varint(&mut out, bytes.len() as u64 + 1);
                out.extend_from_slice(bytes);
            }
        }
    }
    out
}

struct ColumnCursor<'a> {
    buf: &'a [u8],
    pos: usize,
    remaining: usize,
}

impl<'a> ColumnCursor<'a> {
    fn new(buf: &'a [u8]) -> Result<Self> {
        let (count, used) = get_varint(buf)?;
        Ok(Self {
            buf,
            pos: used,
            remaining: count as usize,
        })
    }

    fn count(buf: &[u8]) -> Result<usize> {
        Ok(get_varint(buf)?.0 as usize)
    }

    fn next_column(&mut self) -> Result<Option<Option<&'a [u8]>>> {
        if self.remaining == 0 {
            return Ok(None);
        }
        self.remaining -= 1;
        let (tag, used) = get_varint(&self.buf[self.pos..])?;
        self.pos += used;
        if tag == 0 {
            return Ok(Some(None));
        }
        let len = (tag - 1) as usize;
        ensure!(
            self.pos + len <= self.buf.len(),
            "row column of {} bytes overruns buffer of {}",
            len,
            self.buf.len()
        );
        let bytes = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(Some(Some(bytes)))
    }
}

pub fn decode_row(buf: &[u8]) -> Result<Vec<Column>> {
    let mut cursor = ColumnCursor::new(buf)?;
    let mut out = Vec::with_capacity(cursor.remaining);
    while let Some(column) = cursor.next_column()? {
        out.push(column.map(<[u8]>::to_vec));
    }
    Ok(out)
}

/// Decodes only the columns in `projection`, in projection order. Other
/// columns are skipped by length.
pub fn decode_projection(buf: &[u8], projection: &[usize]) -> Result<Vec<Column>> {
    let count = ColumnCursor::count(buf)?;
    for &col in projection {
        ensure!(col < count, "projected column {} beyond row width {}", col, count);
    }
    let Some(&last) = projection.iter().max() else {
        return Ok(Vec::new());
    };

    let mut wanted: Vec<Option<Column>> = vec![None; last + 1];
    let mut cursor = ColumnCursor::new(buf)?;
    for index in 0..=last {
        // last < count, checked above.
        let column = cursor.next_column()?.unwrap_or(None);
        if projection.contains(&index) {
            wanted[index] = Some(column.map(<[u8]>::to_vec));
        }
    }
    Ok(projection
        .iter()
        .map(|&col| wanted[col].clone().flatten())
        .collect())
}

/// Re-encodes `row` keeping only `columns`; the rest become NULL.
pub fn restrict_row(row: &[u8], columns: &[usize]) -> Result<Vec<u8>> {
    let decoded = decode_row(row)?;
    let kept: Vec<Option<&[u8]>> = decoded
        .iter()
        .enumerate()
        .map(|(i, c)| if columns.contains(&i) { c.as_deref() } else { None })
        .collect();
    Ok(encode_row(&kept))
}

/// Column-wise merge of group payloads: the first non-NULL value wins.
pub fn merge_rows(parts: &[Vec<u8>]) -> Result<Vec<u8>> {
    let mut merged: Vec<Column> = Vec::new();
    for part in parts {
        let columns = decode_row(part)?;
        if merged.len() < columns.len() {
            merged.resize(columns.len(), None);
        }
        for (slot, column) in merged.iter_mut().zip(columns) {
            if slot.is_none() {
                *slot = column;
            }
        }
    }
    let borrowed: Vec<Option<&[u8]>> = merged.iter().map(|c| c.as_deref()).collect();
    Ok(encode_row(&borrowed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn null_and_empty_are_distinct() {
        let row = encode_row(&[None, Some(&b""[..]), Some(&b"x"[..])]);
        assert_eq!(row, [3, 0, 1, 2, b'x']);
        assert_eq!(
            decode_row(&row).unwrap(),
            vec![None, Some(vec![]), Some(b"x".to_vec())]
        );
    }

    #[test]
    fn projection_follows_requested_order() {
        let row = encode_row(&[Some(&b"a"[..]), Some(&b"bb"[..]), None, Some(&b"dddd"[..])]);
        let got = decode_projection(&row, &[3, 0, 2]).unwrap();
        assert_eq!(got, vec![Some(b"dddd".to_vec()), Some(b"a".to_vec()), None]);
        assert!(decode_projection(&row, &[4]).is_err());
        assert!(decode_projection(&row, &[]).unwrap().is_empty());
    }

    #[test]
    fn truncated_column_is_rejected() {
        let mut row = encode_row(&[Some(&b"abcdef"[..])]);
        row.truncate(row.len() - 2);
        assert!(decode_row(&row).is_err());
    }

    #[test]
    fn groups_merge_back_into_the_row() {
        let row = encode_row(&[Some(&b"id"[..]), Some(&b"name"[..]), Some(&b"blob"[..])]);
        let g0 = restrict_row(&row, &[0]).unwrap();
        let g1 = restrict_row(&row, &[1, 2]).unwrap();
        assert_eq!(decode_row(&g0).unwrap()[1], None);
        assert_eq!(merge_rows(&[g0, g1]).unwrap(), row);
    }

    proptest! {
        #[test]
        fn projection_agrees_with_full_decode(
            columns in prop::collection::vec(prop::option::of(prop::collection::vec(any::<u8>(), 0..300)), 1..12),
            picks in prop::collection::vec(any::<prop::sample::Index>(), 0..6),
        ) {
            let borrowed: Vec<Option<&[u8]>> = columns.iter().map(|c| c.as_deref()).collect();
            let row = encode_row(&borrowed);
            let projection: Vec<usize> = picks.iter().map(|i| i.index(columns.len())).collect();
            let projected = decode_projection(&row, &projection).unwrap();
            let full = decode_row(&row).unwrap();
            prop_assert_eq!(&full, &columns);
            for (got, &col) in projected.iter().zip(&projection) {
                prop_assert_eq!(got, &columns[col]);
            }
        }
    }
}
