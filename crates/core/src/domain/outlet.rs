use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outlet {
    pub name: String,
    pub address: String,
    pub city: String,
    pub state: String,
    pub status: String,
    pub operating_hours: String,
}
