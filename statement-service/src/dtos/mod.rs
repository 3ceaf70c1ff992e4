pub mod admin;
pub mod statements;

pub use admin::{RegisterUserRequest, SetPermissionsRequest, SetRoleRequest, UserResponse};
pub use statements::{
    AccountView, AccountsResponse, BalancesParams, BalancesResponse, StatementRequest,
    TextStatementResponse,
};
