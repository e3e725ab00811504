//! QueryBuilder for fluent query construction
//!
//! Builds a resource path with OData system query options. Expressions are
//! opaque strings: nothing here parses or validates filter/orderby grammar.

use super::params::ODataPath;
use crate::api::constants::params;

#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    endpoint: String,
    apply: Option<String>,
    filter: Option<String>,
    select: Option<String>,
    expand: Option<String>,
    orderby: Option<String>,
    top: Option<u64>,
    skip: Option<u64>,
    count: bool,
}

impl QueryBuilder {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Default::default()
        }
    }

    /// Raw `$apply` transformation, e.g. `groupby((city))/aggregate($count as n)`
    pub fn apply(mut self, apply: impl Into<String>) -> Self {
        self.apply = non_empty(apply.into());
        self
    }

    /// `$apply` aggregation, grouped by `groupby` (comma separated) when given
    pub fn aggregate(self, groupby: &str, aggregate: &str) -> Self {
        if aggregate.trim().is_empty() {
            return self;
        }
        let expression = aggregate_expression(groupby, aggregate);
        self.apply(expression)
    }

    /// Add `$filter`; empty expressions are ignored
    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = non_empty(filter.into());
        self
    }

    /// Select specific fields (comma separated)
    pub fn select(mut self, fields: impl Into<String>) -> Self {
        self.select = non_empty(fields.into());
        self
    }

    /// Expand related entities
    pub fn expand(mut self, expand: impl Into<String>) -> Self {
        self.expand = non_empty(expand.into());
        self
    }

    pub fn orderby(mut self, orderby: impl Into<String>) -> Self {
        self.orderby = non_empty(orderby.into());
        self
    }

    /// Limit number of results; zero means no limit
    pub fn top(mut self, top: u64) -> Self {
        self.top = (top > 0).then_some(top);
        self
    }

    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = (skip > 0).then_some(skip);
        self
    }

    /// Include count in response
    pub fn count(mut self) -> Self {
        self.count = true;
        self
    }

    /// Build the final path; options already present on the endpoint are replaced
    pub fn build(self) -> ODataPath {
        let mut path = ODataPath::parse(&self.endpoint);

        let text_options = [
            (params::APPLY, self.apply),
            (params::FILTER, self.filter),
            (params::SELECT, self.select),
            (params::EXPAND, self.expand),
            (params::ORDERBY, self.orderby),
        ];
        for (name, value) in text_options {
            if let Some(value) = value {
                path.set(name, &value);
            }
        }

        if let Some(top) = self.top {
            path.set_raw(params::TOP, top.to_string());
        }
        if let Some(skip) = self.skip {
            path.set_raw(params::SKIP, skip.to_string());
        }
        if self.count {
            path.set_raw(params::COUNT, "true");
        }

        path
    }
}

fn non_empty(value: String) -> Option<String> {
    (!value.trim().is_empty()).then_some(value)
}

/// Build an `$apply` value: `groupby((fields))/aggregate(expr)` or `aggregate(expr)`
pub fn aggregate_expression(groupby: &str, aggregate: &str) -> String {
    let groupby = groupby.trim();
    if groupby.is_empty() {
        format!("aggregate({})", aggregate.trim())
    } else {
        format!("groupby(({}))/aggregate({})", groupby, aggregate.trim())
    }
}

/// Address a single entity by key: `endpoint('key')`, with quotes doubled
pub fn entity_key_path(endpoint: &str, key: &str) -> String {
    format!("{}('{}')", endpoint.trim_end_matches('/'), key.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_query_builder() {
        let path = QueryBuilder::new("/salesOrders")
            .filter("status eq 'Open'")
            .select("number,customerName")
            .orderby("number desc")
            .top(10)
            .build();

        assert_eq!(path.path(), "/salesOrders");
        assert_eq!(path.get("$filter").as_deref(), Some("status eq 'Open'"));
        assert_eq!(path.get("$select").as_deref(), Some("number,customerName"));
        assert_eq!(path.get("$orderby").as_deref(), Some("number desc"));
        assert_eq!(path.top(), Some(10));
        assert!(path.to_string().contains("$filter=status%20eq%20%27Open%27"));
    }

    #[test]
    fn test_empty_and_zero_options_are_skipped() {
        let path = QueryBuilder::new("customers")
            .filter("")
            .select("   ")
            .top(0)
            .skip(0)
            .build();

        assert_eq!(path.to_string(), "customers");
    }

    #[test]
    fn test_count_with_skip_and_expand() {
        let path = QueryBuilder::new("customers")
            .expand("contacts")
            .skip(40)
            .count()
            .build();

        assert_eq!(path.to_string(), "customers?$expand=contacts&$skip=40&$count=true");
    }

    #[test]
    fn test_builder_merges_with_existing_query() {
        let path = QueryBuilder::new("items?$top=5&$select=No")
            .top(3)
            .build();

        assert_eq!(path.to_string(), "items?$top=3&$select=No");
    }

    #[test]
    fn test_aggregate_with_groupby_and_filter() {
        let path = QueryBuilder::new("salesOrders")
            .aggregate("customerNumber", "totalAmountIncludingTax with sum as total")
            .filter("status eq 'Open'")
            .build();

        assert_eq!(
            path.get("$apply").as_deref(),
            Some("groupby((customerNumber))/aggregate(totalAmountIncludingTax with sum as total)")
        );
        assert_eq!(path.get("$filter").as_deref(), Some("status eq 'Open'"));
        assert!(path.to_string().starts_with("salesOrders?$apply=groupby"));
    }

    #[test]
    fn test_aggregate_without_groupby() {
        assert_eq!(aggregate_expression("", "$count as n"), "aggregate($count as n)");

        let path = QueryBuilder::new("items").aggregate("category", " ").build();
        assert!(!path.contains("$apply"));
    }

    #[test]
    fn test_entity_key_path() {
        assert_eq!(entity_key_path("customers", "10000"), "customers('10000')");
        assert_eq!(entity_key_path("items/", "O'Brien"), "items('O''Brien')");
    }
}
