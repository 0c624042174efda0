pub mod employee_repository;
pub mod sqlite_repository;

pub use employee_repository::{CompanyRepository, EmployeeRepository, InMemoryEmployeeRepository};
pub use sqlite_repository::SqliteEmployeeRepository;
