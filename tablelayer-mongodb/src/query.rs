//! Query translation from the tablelayer AST to MongoDB query syntax.
//!
//! Field names are used as given, so dotted paths address embedded fields.

use bson::{Bson, Document, doc};

use tablelayer_core::{
    error::TableLayerError,
    query::{Expr, FieldOp, QueryVisitor},
};

/// Translates query expressions into MongoDB filter documents.
pub(crate) struct MongoQueryTranslator;

impl MongoQueryTranslator {
    /// Translates an optional filter; `None` matches every document.
    pub(crate) fn translate(filter: Option<&Expr>) -> Result<Document, TableLayerError> {
        match filter {
            Some(expr) => MongoQueryTranslator.visit_expr(expr),
            None => Ok(doc! {}),
        }
    }

    fn visit_all(&mut self, exprs: &[Expr]) -> Result<Vec<Document>, TableLayerError> {
        exprs
            .iter()
            .map(|expr| self.visit_expr(expr))
            .collect()
    }
}

impl QueryVisitor for MongoQueryTranslator {
    type Output = Document;
    type Error = TableLayerError;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        // `$and` must be non-empty
        if exprs.is_empty() {
            return Ok(doc! {});
        }

        Ok(doc! { "$and": self.visit_all(exprs)? })
    }

    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        Ok(doc! { "$or": self.visit_all(exprs)? })
    }

    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        Ok(doc! { "$nor": [self.visit_expr(expr)?] })
    }

    fn visit_exists(&mut self, field: &str, should_exist: bool) -> Result<Self::Output, Self::Error> {
        Ok(doc! {
            field: { "$exists": should_exist },
        })
    }

    fn visit_text(&mut self, term: &str) -> Result<Self::Output, Self::Error> {
        Ok(doc! { "$text": { "$search": term } })
    }

    fn visit_field(&mut self, field: &str, op: &FieldOp, value: &Bson) -> Result<Self::Output, Self::Error> {
        Ok(doc! {
            field: match op {
                FieldOp::Eq => doc! { "$eq": value },
                FieldOp::Ne => doc! { "$ne": value },
                FieldOp::Gt => doc! { "$gt": value },
                FieldOp::Gte => doc! { "$gte": value },
                FieldOp::Lt => doc! { "$lt": value },
                FieldOp::Lte => doc! { "$lte": value },
                FieldOp::AnyOf => doc! { "$in": value },
                FieldOp::NoneOf => doc! { "$nin": value },
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::oid::ObjectId;
    use tablelayer_core::query::Filter;

    #[test]
    fn criteria_round_trip_into_mongo_filters() {
        let owner = ObjectId::new();
        let expr = Filter::and([
            Filter::eq("user_id", owner),
            Filter::any_of("role", vec!["admin", "user"]),
            Filter::text("alice"),
        ]);

        assert_eq!(
            MongoQueryTranslator::translate(Some(&expr)).unwrap(),
            doc! {
                "$and": [
                    { "user_id": { "$eq": owner } },
                    { "role": { "$in": ["admin", "user"] } },
                    { "$text": { "$search": "alice" } },
                ]
            }
        );
    }

    #[test]
    fn empty_conjunction_matches_everything() {
        assert_eq!(MongoQueryTranslator::translate(Some(&Filter::and([]))).unwrap(), doc! {});
        assert_eq!(MongoQueryTranslator::translate(None).unwrap(), doc! {});
    }

    #[test]
    fn negation_uses_nor() {
        let expr = Filter::eq("status", "inactive").not();

        assert_eq!(
            MongoQueryTranslator::translate(Some(&expr)).unwrap(),
            doc! { "$nor": [{ "status": { "$eq": "inactive" } }] }
        );
    }
}
