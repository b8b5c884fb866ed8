use std::fmt::Write;

use super::Bit;

/// Render the intersect of `rows` on `field`.
///
/// A single row is sent as a bare `Row(...)` call; an empty list renders an empty
/// `Intersect()`, which the server rejects.
pub fn render_intersect(field: &str, rows: &[u64]) -> String {
    if rows.len() == 1 {
        return format!("Row({}={})", field, rows[0]);
    }
    let mut pql = String::from("Intersect(");
    for (i, row) in rows.iter().enumerate() {
        if i > 0 {
            pql.push_str(", ");
        }
        let _ = write!(pql, "Row({}={})", field, row);
    }
    pql.push(')');
    pql
}

/// Render a batch of bit mutations as one multi-call PQL request.
pub fn render_mutations(field: &str, bits: &[Bit], clear: bool) -> String {
    let call = if clear { "Clear" } else { "Set" };
    let mut pql = String::with_capacity(bits.len() * 24);
    for bit in bits {
        let _ = writeln!(pql, "{}({}, {}={})", call, bit.column, field, bit.row);
    }
    pql
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_intersect() {
        assert_eq!(render_intersect("f1", &[3]), "Row(f1=3)");
        assert_eq!(
            render_intersect("f1", &[3, 7, 3]),
            "Intersect(Row(f1=3), Row(f1=7), Row(f1=3))"
        );
    }

    #[test]
    fn test_render_mutations() {
        let bits = [Bit { row: 1, column: 10 }, Bit { row: 2, column: 20 }];
        assert_eq!(render_mutations("f", &bits, false), "Set(10, f=1)\nSet(20, f=2)\n");
        assert_eq!(render_mutations("f", &bits[..1], true), "Clear(10, f=1)\n");
    }
}
