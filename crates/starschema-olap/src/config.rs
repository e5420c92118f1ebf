/// Table and column names of the sales star schema.
///
/// Defaults follow the generated dataset layout. Override individual names with struct update
/// syntax:
///
/// ```
/// use starschema_olap::StarSchemaConfig;
///
/// let config = StarSchemaConfig {
///     gross_sales: "revenue".to_string(),
///     ..StarSchemaConfig::default()
/// };
/// assert_eq!(config.profit, "profit");
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StarSchemaConfig {
    pub fact_table: String,
    pub time_table: String,
    pub geography_table: String,
    pub product_table: String,
    pub customer_table: String,

    pub date_key: String,
    pub geography_key: String,
    pub product_key: String,
    pub customer_key: String,

    pub quantity: String,
    pub gross_sales: String,
    pub total_cost: String,
    pub profit: String,

    pub year: String,
    pub quarter: String,
    pub month: String,
    pub is_weekend: String,
    pub region: String,
    pub country: String,
    pub category: String,
    pub product_name: String,
    pub customer_type: String,
}

impl Default for StarSchemaConfig {
    fn default() -> Self {
        Self {
            fact_table: "fact_sales".to_string(),
            time_table: "dim_time".to_string(),
            geography_table: "dim_geography".to_string(),
            product_table: "dim_product".to_string(),
            customer_table: "dim_customer".to_string(),

            date_key: "date_key".to_string(),
            geography_key: "geography_key".to_string(),
            product_key: "product_key".to_string(),
            customer_key: "customer_key".to_string(),

            quantity: "quantity".to_string(),
            gross_sales: "gross_sales".to_string(),
            total_cost: "total_cost".to_string(),
            profit: "profit".to_string(),

            year: "year".to_string(),
            quarter: "quarter".to_string(),
            month: "month".to_string(),
            is_weekend: "is_weekend".to_string(),
            region: "region".to_string(),
            country: "country".to_string(),
            category: "category".to_string(),
            product_name: "product_name".to_string(),
            customer_type: "customer_type".to_string(),
        }
    }
}
