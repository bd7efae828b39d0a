pub mod table_names;
