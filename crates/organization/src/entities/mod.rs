pub mod company;
pub mod employee;

pub use company::{Company, CompanyId};
pub use employee::{DisableReason, Employee, EmployeeId, EmployeeStatus, InvitationStatus, Invitee};
