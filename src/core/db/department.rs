use std::future::Future;

/// Municipal department a report can be routed to. The name doubles as the
/// taxonomy category it owns, e.g. "Traffic".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Department {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct NewDepartment {
    pub name: String,
}

pub trait DepartmentRepository {
    fn add_department(&self, department: &NewDepartment) -> impl Future<Output = anyhow::Result<Department>>;
    fn get_departments(&self) -> impl Future<Output = anyhow::Result<Vec<Department>>>;
    fn get_department_by_id(&self, id: i64) -> impl Future<Output = anyhow::Result<Option<Department>>>;
    /// Exact, case-sensitive name match
    fn find_department_by_name(&self, name: &str) -> impl Future<Output = anyhow::Result<Option<Department>>>;
    /// Deleting a department deletes the reports routed to it.
    fn delete_department(&self, department: Department) -> impl Future<Output = anyhow::Result<()>>;
}
