//! Common test utilities and the shared department/employee data set
#![allow(dead_code)]

use entity_repository::{Entity, EntityModel, MemoryDatabase, MemorySession, Repository};
use rust_decimal::Decimal;
use std::sync::Arc;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Department {
    pub id: i32,
    pub name: String,
    pub employees: Vec<Arc<Employee>>,
}

impl Entity for Department {
    type Key = i32;
    const NAME: &'static str = "Department";

    fn id(&self) -> &i32 {
        &self.id
    }
}

/// Employee with two single-valued relations (`department`, `manager`) and
/// one collection (`reports`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Employee {
    pub id: i32,
    pub name: String,
    pub department_id: i32,
    pub salary: Decimal,
    pub manager_id: Option<i32>,
    pub department: Option<Arc<Department>>,
    pub manager: Option<Arc<Employee>>,
    pub reports: Vec<Arc<Employee>>,
}

impl Entity for Employee {
    type Key = i32;
    const NAME: &'static str = "Employee";

    fn id(&self) -> &i32 {
        &self.id
    }
}

/// Entity type never registered with any test database
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Project {
    pub id: u64,
}

impl Entity for Project {
    type Key = u64;
    const NAME: &'static str = "Project";

    fn id(&self) -> &u64 {
        &self.id
    }
}

pub fn employee(id: i32, name: &str, department_id: i32, salary: i64, manager_id: Option<i32>) -> Employee {
    Employee {
        id,
        name: name.to_owned(),
        department_id,
        salary: Decimal::from(salary),
        manager_id,
        ..Default::default()
    }
}

pub fn initial_departments() -> Vec<Department> {
    [(1, "Computer"), (2, "Account"), (3, "Engineering"), (4, "Human Resource")]
        .into_iter()
        .map(|(id, name)| Department {
            id,
            name: name.to_owned(),
            employees: Vec::new(),
        })
        .collect()
}

pub fn initial_employees() -> Vec<Employee> {
    vec![
        employee(1, "John", 3, 25000, None),
        employee(2, "Robert", 3, 15000, Some(1)),
        employee(3, "Richard", 2, 10000, None),
        employee(4, "Mark", 2, 7500, Some(3)),
        employee(5, "Stefan", 1, 5000, None),
    ]
}

pub fn department_model() -> EntityModel<Department> {
    EntityModel::<Department>::new()
        .generated_key(|d, next| d.id = next as i32)
        .collection::<Employee>(
            "employees",
            |d, e| e.department_id == d.id,
            |d, employees| d.employees = employees,
        )
}

pub fn employee_model() -> EntityModel<Employee> {
    EntityModel::<Employee>::new()
        .generated_key(|e, next| e.id = next as i32)
        .reference::<Department>(
            "department",
            |e| Some(e.department_id),
            |e, department| e.department = department,
        )
        .collection::<Employee>(
            "reports",
            |e, other| other.manager_id == Some(e.id),
            |e, reports| e.reports = reports,
        )
        .reference::<Employee>("manager", |e| e.manager_id, |e, manager| e.manager = manager)
}

/// Database with both entity types registered and the initial rows seeded
pub fn seeded_database() -> MemoryDatabase {
    let db = MemoryDatabase::new();
    db.register(department_model()).register(employee_model());
    db.seed(initial_departments())
        .expect("Failed to seed departments");
    db.seed(initial_employees()).expect("Failed to seed employees");
    db
}

/// Fresh session plus an employee repository bound to it
pub fn employee_repository(
    db: &MemoryDatabase,
) -> (Arc<MemorySession>, Repository<MemorySession, Employee>) {
    let session = db.session();
    let repo = Repository::new(Arc::clone(&session)).expect("Failed to create employee repository");
    (session, repo)
}

pub fn ids(employees: &[Employee]) -> Vec<i32> {
    employees.iter().map(|e| e.id).collect()
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn print_test_header(test_name: &str, purpose: &[&str]) {
    init_tracing();
    println!("\n🧪 TEST: {}", test_name);
    if let Some(first) = purpose.first() {
        println!("📋 PURPOSE: {}", first);
    }
    for line in purpose.iter().skip(1) {
        println!("   {}", line);
    }
}
