//! Especificación tipada de consultas
//!
//! Tabla lógica, joins, filtros, orden y paginación compuestos de forma
//! declarativa y renderizados como sentencias parametrizadas. Los
//! identificadores solo pueden venir de `&'static str` del propio código;
//! todo valor de usuario va por `push_bind`.

use sqlx::{Postgres, QueryBuilder};

/// Prefijo físico de todas las tablas del dominio
const TABLE_PREFIX: &str = "dr_";

pub const MAX_PAGE_SIZE: u32 = 100;

/// Tablas lógicas
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    Vehicle,
    Route,
    FlightTask,
    FlightLog,
}

impl Table {
    fn logical_name(self) -> &'static str {
        match self {
            Table::Vehicle => "vehicle",
            Table::Route => "route",
            Table::FlightTask => "flight_task",
            Table::FlightLog => "flight_log",
        }
    }

    /// Nombre físico con prefijo
    pub fn name(self) -> String {
        format!("{}{}", TABLE_PREFIX, self.logical_name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

/// Valor ligado a un filtro
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    SmallInt(i16),
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i16> for Value {
    fn from(v: i16) -> Self {
        Value::SmallInt(v)
    }
}

#[derive(Debug, Clone)]
struct Join {
    table: Table,
    alias: &'static str,
    left: &'static str,
    right: &'static str,
}

/// Filtro de igualdad
#[derive(Debug, Clone)]
struct Filter {
    column: &'static str,
    value: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: u32,
    pub page_size: u32,
}

impl Pagination {
    /// Página desde 1 y tamaño acotado a `1..=MAX_PAGE_SIZE`
    pub fn new(page: u32, page_size: u32) -> Self {
        Self {
            page: page.max(1),
            page_size: page_size.clamp(1, MAX_PAGE_SIZE),
        }
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page - 1) * i64::from(self.page_size)
    }
}

/// Consulta sobre una tabla lógica
#[derive(Debug, Clone)]
pub struct QuerySpec {
    table: Table,
    alias: &'static str,
    joins: Vec<Join>,
    filters: Vec<Filter>,
    order: Vec<(&'static str, Direction)>,
    pagination: Option<Pagination>,
}

impl QuerySpec {
    pub fn from(table: Table, alias: &'static str) -> Self {
        Self {
            table,
            alias,
            joins: Vec::new(),
            filters: Vec::new(),
            order: Vec::new(),
            pagination: None,
        }
    }

    /// `LEFT JOIN` por igualdad de columnas (`left = right`)
    pub fn left_join(mut self, table: Table, alias: &'static str, left: &'static str, right: &'static str) -> Self {
        self.joins.push(Join { table, alias, left, right });
        self
    }

    fn filter(mut self, column: &'static str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter {
            column,
            value: value.into(),
        });
        self
    }

    /// Filtro de igualdad que se omite si no hay valor
    pub fn filter_opt<V: Into<Value>>(self, column: &'static str, value: Option<V>) -> Self {
        match value {
            Some(v) => self.filter(column, v),
            None => self,
        }
    }

    pub fn order_by(mut self, column: &'static str, direction: Direction) -> Self {
        self.order.push((column, direction));
        self
    }

    pub fn paginate(mut self, pagination: Pagination) -> Self {
        self.pagination = Some(pagination);
        self
    }

    /// `SELECT <columns> ...` con orden y paginación
    pub fn select_query(&self, columns: &[&'static str]) -> QueryBuilder<'static, Postgres> {
        let mut qb = QueryBuilder::new("SELECT ");
        qb.push(columns.join(", "));
        self.push_from_and_where(&mut qb);

        if !self.order.is_empty() {
            qb.push(" ORDER BY ");
            let order: Vec<String> = self
                .order
                .iter()
                .map(|(col, dir)| match dir {
                    Direction::Asc => format!("{} ASC", col),
                    Direction::Desc => format!("{} DESC", col),
                })
                .collect();
            qb.push(order.join(", "));
        }

        if let Some(p) = self.pagination {
            qb.push(" LIMIT ");
            qb.push_bind(i64::from(p.page_size));
            qb.push(" OFFSET ");
            qb.push_bind(p.offset());
        }

        qb
    }

    /// `SELECT COUNT(*) ...` con los mismos joins y filtros, sin orden ni paginación
    pub fn count_query(&self) -> QueryBuilder<'static, Postgres> {
        let mut qb = QueryBuilder::new("SELECT COUNT(*)");
        self.push_from_and_where(&mut qb);
        qb
    }

    fn push_from_and_where(&self, qb: &mut QueryBuilder<'static, Postgres>) {
        qb.push(" FROM ");
        qb.push(self.table.name());
        qb.push(" AS ");
        qb.push(self.alias);

        for join in &self.joins {
            qb.push(" LEFT JOIN ");
            qb.push(join.table.name());
            qb.push(" AS ");
            qb.push(join.alias);
            qb.push(" ON ");
            qb.push(join.left);
            qb.push(" = ");
            qb.push(join.right);
        }

        for (i, filter) in self.filters.iter().enumerate() {
            qb.push(if i == 0 { " WHERE " } else { " AND " });
            qb.push(filter.column);
            qb.push(" = ");
            match filter.value {
                Value::Int(v) => qb.push_bind(v),
                Value::SmallInt(v) => qb.push_bind(v),
            };
        }
    }
}
