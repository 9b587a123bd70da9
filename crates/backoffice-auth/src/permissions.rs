//! Capabilities, roles and the static role → capability table
//!
//! The backend sends permissions as plain strings. They are kept as strings
//! in [`PermissionSet`] so an unknown capability added server-side never
//! breaks session loading; checks go through the typed [`Permission`] enum.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A capability the back office gates screens and actions on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Permission {
    /// Wildcard held by super administrators; satisfies every check.
    AllPermissions,
    ManageUsers,
    ManageCompany,
    ViewReports,
    ManagePayments,
    ManageOrders,
    ViewOrders,
    ManageReservations,
    ViewReservations,
    ManageInventory,
    ManageTables,
    ManageCashRegister,
    ManageKitchen,
    UpdateOrderStatus,
}

impl Permission {
    pub const ALL: [Permission; 14] = [
        Permission::AllPermissions,
        Permission::ManageUsers,
        Permission::ManageCompany,
        Permission::ViewReports,
        Permission::ManagePayments,
        Permission::ManageOrders,
        Permission::ViewOrders,
        Permission::ManageReservations,
        Permission::ViewReservations,
        Permission::ManageInventory,
        Permission::ManageTables,
        Permission::ManageCashRegister,
        Permission::ManageKitchen,
        Permission::UpdateOrderStatus,
    ];

    /// Wire name as sent by the backend.
    pub fn as_str(self) -> &'static str {
        match self {
            Permission::AllPermissions => "ALL_PERMISSIONS",
            Permission::ManageUsers => "MANAGE_USERS",
            Permission::ManageCompany => "MANAGE_COMPANY",
            Permission::ViewReports => "VIEW_REPORTS",
            Permission::ManagePayments => "MANAGE_PAYMENTS",
            Permission::ManageOrders => "MANAGE_ORDERS",
            Permission::ViewOrders => "VIEW_ORDERS",
            Permission::ManageReservations => "MANAGE_RESERVATIONS",
            Permission::ViewReservations => "VIEW_RESERVATIONS",
            Permission::ManageInventory => "MANAGE_INVENTORY",
            Permission::ManageTables => "MANAGE_TABLES",
            Permission::ManageCashRegister => "MANAGE_CASH_REGISTER",
            Permission::ManageKitchen => "MANAGE_KITCHEN",
            Permission::UpdateOrderStatus => "UPDATE_ORDER_STATUS",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Permission {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Permission::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| format!("unknown permission: {s}"))
    }
}

/// Unordered set of capability strings held by a session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionSet(BTreeSet<String>);

impl PermissionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the wildcard is present.
    pub fn is_unrestricted(&self) -> bool {
        self.0.contains(Permission::AllPermissions.as_str())
    }

    pub fn allows(&self, permission: Permission) -> bool {
        self.is_unrestricted() || self.0.contains(permission.as_str())
    }

    pub fn allows_any(&self, permissions: &[Permission]) -> bool {
        self.is_unrestricted() || permissions.iter().any(|p| self.0.contains(p.as_str()))
    }

    pub fn allows_all(&self, permissions: &[Permission]) -> bool {
        self.is_unrestricted() || permissions.iter().all(|p| self.0.contains(p.as_str()))
    }

    pub fn insert(&mut self, permission: impl Into<String>) {
        self.0.insert(permission.into());
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<Permission> for PermissionSet {
    fn from_iter<I: IntoIterator<Item = Permission>>(iter: I) -> Self {
        Self(iter.into_iter().map(|p| p.as_str().to_string()).collect())
    }
}

/// Staff role (`tipoUsuario` on the wire).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    SuperAdmin,
    Admin,
    Manager,
    Cashier,
    Waiter,
    Cook,
    Customer,
}

impl Role {
    pub const ALL: [Role; 7] = [
        Role::SuperAdmin,
        Role::Admin,
        Role::Manager,
        Role::Cashier,
        Role::Waiter,
        Role::Cook,
        Role::Customer,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Role::SuperAdmin => "SUPER_ADMIN",
            Role::Admin => "ADMIN",
            Role::Manager => "GERENTE",
            Role::Cashier => "CAJERO",
            Role::Waiter => "MESERO",
            Role::Cook => "COCINERO",
            Role::Customer => "CLIENTE",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Role::SuperAdmin => "Super administrator",
            Role::Admin => "Administrator",
            Role::Manager => "Manager",
            Role::Cashier => "Cashier",
            Role::Waiter => "Waiter",
            Role::Cook => "Cook",
            Role::Customer => "Customer",
        }
    }

    /// Capabilities granted to the role by default.
    pub fn default_permissions(self) -> &'static [Permission] {
        use Permission::*;
        match self {
            Role::SuperAdmin => &[AllPermissions],
            Role::Admin => &[
                ManageUsers,
                ManageCompany,
                ViewReports,
                ManagePayments,
                ManageOrders,
                ViewOrders,
                ManageReservations,
                ViewReservations,
                ManageInventory,
            ],
            Role::Manager => &[
                ViewReports,
                ManagePayments,
                ManageOrders,
                ViewOrders,
                ManageReservations,
                ViewReservations,
                ManageInventory,
            ],
            Role::Cashier => &[ManagePayments, ViewOrders, ManageCashRegister],
            Role::Waiter => &[ManageOrders, ViewOrders, ViewReservations, ManageTables],
            Role::Cook => &[ViewOrders, ManageKitchen, UpdateOrderStatus],
            Role::Customer => &[],
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| format!("unknown role: {s}"))
    }
}
