use super::schema;
use diesel::prelude::*;

#[derive(Debug, Clone, PartialEq, Eq, Queryable, Selectable)]
#[diesel(table_name = schema::directories)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct DirectoryRecord {
    pub id: i64,
    pub parent_id: Option<i64>,
    pub name: String,
}

/// File row without its content column.
#[derive(Debug, Clone, PartialEq, Eq, Queryable, Selectable)]
#[diesel(table_name = schema::files)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct FileRecord {
    pub id: i64,
    pub parent_id: i64,
    pub name: String,
    pub size: i64,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = schema::directories)]
pub struct NewDirectory<'a> {
    pub parent_id: Option<i64>,
    pub name: &'a str,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = schema::files)]
pub struct NewFile<'a> {
    pub parent_id: i64,
    pub name: &'a str,
    pub size: i64,
    pub content: &'a [u8],
}
