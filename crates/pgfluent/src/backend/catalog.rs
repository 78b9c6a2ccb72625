//! Catalog introspection statements.
//!
//! Each takes the table name as `$1`. The double cast lets an untyped prepare
//! infer `text` for the parameter before it is resolved through `regclass`,
//! which also honours `search_path` and schema-qualified names.

pub(crate) const DESCRIBE_COLUMNS: &str = "\
SELECT c.column_name::text AS name, \
c.data_type::text AS data_type, \
(c.is_nullable = 'YES') AS nullable, \
c.column_default::text AS default_value \
FROM information_schema.columns c \
JOIN pg_class t ON t.relname = c.table_name \
JOIN pg_namespace n ON n.oid = t.relnamespace AND n.nspname = c.table_schema \
WHERE t.oid = $1::text::regclass \
ORDER BY c.ordinal_position";

pub(crate) const PRIMARY_KEY_COLUMNS: &str = "\
SELECT a.attname::text AS column_name \
FROM pg_index i \
JOIN pg_attribute a ON a.attrelid = i.indrelid AND a.attnum = ANY(i.indkey) \
WHERE i.indrelid = $1::text::regclass AND i.indisprimary \
ORDER BY array_position(i.indkey::int2[], a.attnum)";

pub(crate) const INDEX_COLUMNS: &str = "\
SELECT ic.relname::text AS index_name, \
a.attname::text AS column_name, \
i.indisunique AS is_unique, \
i.indisprimary AS is_primary \
FROM pg_index i \
JOIN pg_class ic ON ic.oid = i.indexrelid \
JOIN pg_attribute a ON a.attrelid = i.indrelid AND a.attnum = ANY(i.indkey) \
WHERE i.indrelid = $1::text::regclass \
ORDER BY ic.relname, array_position(i.indkey::int2[], a.attnum)";
