//! Scan/join operator.

use crate::catalog::Catalog;
use crate::datum::Datum;
use crate::error::Error;
use crate::tuple::Tuple;

/// Extends the accumulated bound tuple with every row of the target relation
/// consistent with it: a nested-loop probe with no index selection beyond
/// what storage offers.
#[derive(Clone, Debug)]
pub struct ScanOp {
    table: String,
    /// Join-key equalities: (bound column index, scanned row column).
    key: Vec<(usize, usize)>,
    /// Intra-clause repeated variables: (scanned row column, scanned row column).
    row_eq: Vec<(usize, usize)>,
    /// Constant arguments in the scanned clause: (scanned row column, value).
    consts: Vec<(usize, Datum)>,
}

impl ScanOp {
    pub fn new(
        table: &str,
        key: Vec<(usize, usize)>,
        row_eq: Vec<(usize, usize)>,
        consts: Vec<(usize, Datum)>,
    ) -> ScanOp {
        ScanOp {
            table: table.to_string(),
            key,
            row_eq,
            consts,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub(crate) fn invoke(
        &self,
        bound: &Tuple,
        catalog: &Catalog,
        out: &mut Vec<Tuple>,
    ) -> Result<(), Error> {
        let def = catalog.lookup(&self.table)?;
        let storage = def.storage().lock().unwrap();
        for row in storage.scan() {
            if self.matches(bound, &row) {
                out.push(bound.concat(&row));
            }
        }
        Ok(())
    }

    fn matches(&self, bound: &Tuple, row: &Tuple) -> bool {
        self.key
            .iter()
            .all(|&(bound_col, row_col)| bound.get(bound_col) == row.get(row_col))
            && self
                .row_eq
                .iter()
                .all(|&(a, b)| row.get(a) == row.get(b))
            && self
                .consts
                .iter()
                .all(|(col, value)| row.get(*col) == value)
    }
}

#[cfg(test)]
mod test {
    use super::ScanOp;
    use crate::catalog::Catalog;
    use crate::datum::{DataType, Datum};
    use crate::schema::Schema;
    use crate::tuple::Tuple;

    fn setup() -> Catalog {
        let catalog = Catalog::new();
        let schema = Schema::new(vec![DataType::Int, DataType::Int]);
        let def = catalog
            .define_table("t", schema.clone(), vec![0, 1], None)
            .unwrap();
        let mut storage = def.storage().lock().unwrap();
        for (x, y) in [(1, 1), (1, 2), (2, 2)] {
            storage.insert(
                Tuple::new("t", &schema, vec![Datum::Int(x), Datum::Int(y)]).unwrap(),
            );
        }
        drop(storage);
        catalog
    }

    #[test]
    fn probe_filters_on_bound_columns() {
        let catalog = setup();
        let scan = ScanOp::new("t", vec![(0, 0)], vec![], vec![]);
        let bound = Tuple::from_datums(vec![Datum::Int(1)]);
        let mut out = Vec::new();
        scan.invoke(&bound, &catalog, &mut out).unwrap();
        // Rows (1,1) and (1,2) match; each output is bound ++ row.
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|t| t.len() == 3 && t.get(1) == &Datum::Int(1)));
    }

    #[test]
    fn repeated_variables_and_constants_constrain_the_row() {
        let catalog = setup();
        let scan = ScanOp::new("t", vec![], vec![(0, 1)], vec![]);
        let mut out = Vec::new();
        scan.invoke(&Tuple::from_datums(vec![]), &catalog, &mut out)
            .unwrap();
        assert_eq!(out.len(), 2); // (1,1) and (2,2)

        let scan = ScanOp::new("t", vec![], vec![], vec![(1, Datum::Int(2))]);
        out.clear();
        scan.invoke(&Tuple::from_datums(vec![]), &catalog, &mut out)
            .unwrap();
        assert_eq!(out.len(), 2); // (1,2) and (2,2)
    }
}
