//! Parameter binding utilities for database queries.
//!
//! This module provides functions to bind `QueryParam` values to queries on
//! the `Any` driver, so every backend shares one binding path.

use crate::models::QueryParam;
use sqlx::Any;
use sqlx::any::AnyArguments;
use sqlx::query::{Query, QueryAs};

/// Bind a parameter to a statement.
pub(crate) fn bind_param<'q>(
    query: Query<'q, Any, AnyArguments<'q>>,
    param: &'q QueryParam,
) -> Query<'q, Any, AnyArguments<'q>> {
    match param {
        QueryParam::Null => query.bind(None::<String>),
        QueryParam::Bool(v) => query.bind(*v),
        QueryParam::Int(v) => query.bind(*v),
        QueryParam::Float(v) => query.bind(*v),
        QueryParam::String(v) => query.bind(v.as_str()),
        QueryParam::Bytes(v) => query.bind(v.as_slice()),
    }
}

/// Bind a parameter to a row-mapping query.
pub(crate) fn bind_param_as<'q, O>(
    query: QueryAs<'q, Any, O, AnyArguments<'q>>,
    param: &'q QueryParam,
) -> QueryAs<'q, Any, O, AnyArguments<'q>> {
    match param {
        QueryParam::Null => query.bind(None::<String>),
        QueryParam::Bool(v) => query.bind(*v),
        QueryParam::Int(v) => query.bind(*v),
        QueryParam::Float(v) => query.bind(*v),
        QueryParam::String(v) => query.bind(v.as_str()),
        QueryParam::Bytes(v) => query.bind(v.as_slice()),
    }
}

/// Bind every parameter in order.
pub(crate) fn bind_all<'q>(
    mut query: Query<'q, Any, AnyArguments<'q>>,
    params: &'q [QueryParam],
) -> Query<'q, Any, AnyArguments<'q>> {
    for param in params {
        query = bind_param(query, param);
    }
    query
}

/// Bind every parameter in order to a row-mapping query.
pub(crate) fn bind_all_as<'q, O>(
    mut query: QueryAs<'q, Any, O, AnyArguments<'q>>,
    params: &'q [QueryParam],
) -> QueryAs<'q, Any, O, AnyArguments<'q>> {
    for param in params {
        query = bind_param_as(query, param);
    }
    query
}
