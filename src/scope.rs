//! Heuristic rewriting of registry SQL to restrict results to one user.
//!
//! This operates on the query text only; there is no SQL parser here and none
//! is wanted. Whenever the text looks too complex to rewrite with confidence,
//! the original query is returned unscoped. An unscoped query yields a
//! cohort-wide value instead of a per-user one, which is always valid SQL.

/// Reserved token a registry query may carry to opt into explicit scoping.
pub const SCOPE_TOKEN: &str = "{user_id}";

/// Single tables we know how to inject a `user_id` filter into.
const SCOPED_TABLES: [&str; 5] = [
    " from users",
    " from workouts",
    " from nutrition",
    " from workout_analysis",
    " from derived_metrics",
];

/// Clause keywords a bare WHERE must be inserted in front of.
const INSERT_BEFORE: [&str; 5] = [" group by", " order by", " limit", " offset", " join"];

/// A rewritten statement plus the value to bind for the explicit-token path.
/// `bind` is `None` when the user id was embedded as a literal or when the
/// query was left untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct ScopedQuery {
    pub sql: String,
    pub bind: Option<i64>,
}

impl ScopedQuery {
    fn unchanged(sql: &str) -> Self {
        ScopedQuery {
            sql: sql.to_string(),
            bind: None,
        }
    }
}

/// Attach a `user_id` filter to `sql` when it is safe to do so.
///
/// Priority order, first match wins:
/// 1. an explicit `{user_id}` token becomes a bound parameter;
/// 2. queries already mentioning `user_id` are assumed handled;
/// 3. joins and nested SELECTs are left alone (text insertion could scope the
///    wrong table or produce invalid SQL);
/// 4. simple single-table queries over a recognized table get a filter spliced
///    into (or appended as) their WHERE clause;
/// 5. anything else is left alone.
///
/// The function never fails; every ambiguous case degrades to the original
/// query. Only the token path uses a bound parameter; the splice paths embed
/// the id as a literal, which stays well-formed because the id is an integer.
pub fn scope_to_user(sql: &str, user_id: i64) -> ScopedQuery {
    if sql.contains(SCOPE_TOKEN) {
        return ScopedQuery {
            sql: sql.replace(SCOPE_TOKEN, "?"),
            bind: Some(user_id),
        };
    }

    let lower = sql.to_ascii_lowercase();
    if lower.contains("user_id") {
        // Already scoped, or scoping does not apply to this query.
        return ScopedQuery::unchanged(sql);
    }

    let has_join = lower.split_whitespace().any(|word| word == "join");
    let select_count = lower.matches("select").count();
    if has_join || select_count > 1 {
        return ScopedQuery::unchanged(sql);
    }

    if !SCOPED_TABLES.iter().any(|t| lower.contains(t)) {
        return ScopedQuery::unchanged(sql);
    }

    if let Some(idx) = lower.find(" where ") {
        let mut rewritten = String::with_capacity(sql.len() + 32);
        rewritten.push_str(&sql[..idx]);
        rewritten.push_str(&format!(" WHERE user_id = {user_id} AND "));
        rewritten.push_str(&sql[idx + " where ".len()..]);
        return ScopedQuery {
            sql: rewritten,
            bind: None,
        };
    }

    let cut = INSERT_BEFORE
        .iter()
        .filter_map(|kw| lower.find(kw))
        .min();
    match cut {
        Some(idx) => {
            let mut rewritten = String::with_capacity(sql.len() + 24);
            rewritten.push_str(&sql[..idx]);
            rewritten.push_str(&format!(" WHERE user_id = {user_id}"));
            rewritten.push_str(&sql[idx..]);
            ScopedQuery {
                sql: rewritten,
                bind: None,
            }
        }
        None => ScopedQuery {
            sql: format!("{sql} WHERE user_id = {user_id}"),
            bind: None,
        },
    }
}
