use std::sync::{PoisonError, RwLock};

use tracing::info;

use crate::error::AppError;
use crate::models::account::{Account, DriverInfo, Role, SignupFields};
use crate::store::read_fixture;

const EMBEDDED_ACCOUNTS: &str = include_str!("../../data/accounts.json");

pub trait AccountRepository: Send + Sync {
    /// First account of `role` whose email and password match exactly.
    fn find_account(&self, email: &str, password: &str, role: Role) -> Option<Account>;

    fn email_exists(&self, email: &str) -> bool;

    /// Validates `fields`, assigns the next sequential id for `role` and appends
    /// the account. The duplicate check and the insert happen atomically.
    fn create_account(&self, fields: &SignupFields, role: Role) -> Result<Account, AppError>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Default)]
pub struct AccountStore {
    accounts: RwLock<Vec<Account>>,
}

impl AccountStore {
    pub fn new(accounts: Vec<Account>) -> Self {
        Self {
            accounts: RwLock::new(accounts),
        }
    }

    pub fn from_json(raw: &str) -> Result<Self, AppError> {
        let accounts: Vec<Account> = serde_json::from_str(raw)
            .map_err(|err| AppError::Internal(format!("invalid accounts fixture: {err}")))?;
        Ok(Self::new(accounts))
    }

    pub fn load(path: Option<&str>) -> Result<Self, AppError> {
        let store = Self::from_json(&read_fixture(path, EMBEDDED_ACCOUNTS)?)?;
        info!(accounts = store.len(), "account store loaded");
        Ok(store)
    }

}

impl AccountRepository for AccountStore {
    fn find_account(&self, email: &str, password: &str, role: Role) -> Option<Account> {
        self.accounts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|account| account.role == role)
            .find(|account| account.email == email && account.password == password)
            .cloned()
    }

    fn email_exists(&self, email: &str) -> bool {
        self.accounts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|account| account.email == email)
    }

    fn create_account(&self, fields: &SignupFields, role: Role) -> Result<Account, AppError> {
        let mut account = build_account(fields, role)?;

        let mut accounts = self.accounts.write().unwrap_or_else(PoisonError::into_inner);
        if accounts.iter().any(|existing| existing.email == account.email) {
            return Err(AppError::DuplicateEmail(account.email));
        }

        account.id = next_id(&accounts, role)?;
        accounts.push(account.clone());

        info!(account_id = %account.id, role = %role, "account created");
        Ok(account)
    }

    fn len(&self) -> usize {
        self.accounts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

fn required(value: &Option<String>, field: &'static str) -> Result<String, AppError> {
    match value.as_deref() {
        Some(value) if !value.is_empty() => Ok(value.to_string()),
        _ => Err(AppError::validation(field, format!("{field} is required"))),
    }
}

fn build_account(fields: &SignupFields, role: Role) -> Result<Account, AppError> {
    let email = required(&fields.email, "email")?;
    let password = required(&fields.password, "password")?;
    let full_name = required(&fields.full_name, "fullName")?;
    let phone = required(&fields.phone, "phone")?;

    let driver_info = match role {
        Role::Rider => None,
        Role::Driver => Some(DriverInfo {
            license_number: required(&fields.license_number, "licenseNumber")?,
            vehicle_make: required(&fields.vehicle_make, "vehicleMake")?,
            vehicle_model: required(&fields.vehicle_model, "vehicleModel")?,
            license_plate: required(&fields.license_plate, "licensePlate")?,
        }),
    };

    Ok(Account {
        id: String::new(),
        full_name,
        email,
        password,
        phone,
        role,
        driver_info,
    })
}

fn next_id(accounts: &[Account], role: Role) -> Result<String, AppError> {
    let prefix = role.id_prefix();
    let highest = accounts
        .iter()
        .filter(|account| account.role == role)
        .filter_map(|account| account.id.strip_prefix(prefix))
        .map(|suffix| suffix.parse::<u32>().unwrap_or(0))
        .max()
        .unwrap_or(0);

    let next = highest
        .checked_add(1)
        .ok_or_else(|| AppError::Internal(format!("{prefix} id sequence exhausted")))?;
    Ok(format!("{prefix}{next:03}"))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::{AccountRepository, AccountStore};
    use crate::error::AppError;
    use crate::models::account::{Role, SignupFields};

    fn rider_fields(email: &str) -> SignupFields {
        SignupFields {
            email: Some(email.to_string()),
            password: Some("secret".to_string()),
            full_name: Some("Test Rider".to_string()),
            phone: Some("12345678".to_string()),
            ..SignupFields::default()
        }
    }

    fn driver_fields(email: &str) -> SignupFields {
        SignupFields {
            license_number: Some("LIC-1".to_string()),
            vehicle_make: Some("Kia".to_string()),
            vehicle_model: Some("Rio".to_string()),
            license_plate: Some("100 TUN 1".to_string()),
            ..rider_fields(email)
        }
    }

    #[test]
    fn embedded_fixture_loads() {
        let store = AccountStore::load(None).unwrap();
        assert!(!store.is_empty());
        assert!(store
            .find_account("amira@rideshare.tn", "rider123", Role::Rider)
            .is_some());
    }

    #[test]
    fn ids_are_sequential_per_role() {
        let store = AccountStore::default();

        let first_rider = store.create_account(&rider_fields("a@x.tn"), Role::Rider).unwrap();
        let first_driver = store.create_account(&driver_fields("b@x.tn"), Role::Driver).unwrap();
        let second_rider = store.create_account(&rider_fields("c@x.tn"), Role::Rider).unwrap();

        assert_eq!(first_rider.id, "RDR001");
        assert_eq!(first_driver.id, "DRV001");
        assert_eq!(second_rider.id, "RDR002");
    }

    #[test]
    fn next_id_follows_highest_existing_suffix() {
        let store = AccountStore::from_json(
            r#"[
                {"id":"RDR007","fullName":"A","email":"a@x.tn","password":"p","phone":"1","role":"rider"},
                {"id":"RDR003","fullName":"B","email":"b@x.tn","password":"p","phone":"1","role":"rider"}
            ]"#,
        )
        .unwrap();

        let created = store.create_account(&rider_fields("c@x.tn"), Role::Rider).unwrap();
        assert_eq!(created.id, "RDR008");
    }

    #[test]
    fn exhausted_id_sequence_is_an_error() {
        let store = AccountStore::from_json(
            r#"[{"id":"RDR4294967295","fullName":"A","email":"a@x.tn","password":"p","phone":"1","role":"rider"}]"#,
        )
        .unwrap();

        let err = store
            .create_account(&rider_fields("b@x.tn"), Role::Rider)
            .unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));
        assert!(!store.email_exists("b@x.tn"));
    }

    #[test]
    fn first_match_in_store_order_wins() {
        let store = AccountStore::from_json(
            r#"[
                {"id":"DRV001","fullName":"Driver","email":"twin@x.tn","password":"p","phone":"1","role":"driver"},
                {"id":"RDR002","fullName":"Earlier","email":"twin@x.tn","password":"p","phone":"1","role":"rider"},
                {"id":"RDR001","fullName":"Later","email":"twin@x.tn","password":"p","phone":"2","role":"rider"}
            ]"#,
        )
        .unwrap();

        let found = store.find_account("twin@x.tn", "p", Role::Rider).unwrap();
        assert_eq!(found.id, "RDR002");
        assert_eq!(found.full_name, "Earlier");
    }

    #[test]
    fn created_account_can_log_in_and_email_is_taken_for_both_roles() {
        let store = AccountStore::default();
        store.create_account(&driver_fields("new@x.tn"), Role::Driver).unwrap();

        let found = store.find_account("new@x.tn", "secret", Role::Driver).unwrap();
        assert_eq!(found.id, "DRV001");
        assert_eq!(found.driver_info.unwrap().vehicle_make, "Kia");

        assert!(store.email_exists("new@x.tn"));
        assert!(store.find_account("new@x.tn", "secret", Role::Rider).is_none());
    }

    #[test]
    fn lookup_is_exact_and_case_sensitive() {
        let store = AccountStore::default();
        store.create_account(&rider_fields("Case@x.tn"), Role::Rider).unwrap();

        assert!(store.find_account("case@x.tn", "secret", Role::Rider).is_none());
        assert!(store.find_account("Case@x.tn", "Secret", Role::Rider).is_none());
        assert!(!store.email_exists("case@x.tn"));
    }

    #[test]
    fn duplicate_email_is_rejected_across_roles() {
        let store = AccountStore::default();
        store.create_account(&rider_fields("dup@x.tn"), Role::Rider).unwrap();

        let err = store
            .create_account(&driver_fields("dup@x.tn"), Role::Driver)
            .unwrap_err();
        assert_eq!(err, AppError::DuplicateEmail("dup@x.tn".to_string()));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn missing_driver_field_is_named() {
        let store = AccountStore::default();
        let mut fields = driver_fields("d@x.tn");
        fields.vehicle_model = Some(String::new());

        let err = store.create_account(&fields, Role::Driver).unwrap_err();
        assert!(matches!(err, AppError::Validation { field: "vehicleModel", .. }));
        assert!(store.is_empty());
    }

    #[test]
    fn rider_signup_ignores_driver_fields() {
        let store = AccountStore::default();
        let account = store.create_account(&rider_fields("r@x.tn"), Role::Rider).unwrap();
        assert!(account.driver_info.is_none());
    }

    #[test]
    fn concurrent_signups_with_same_email_create_one_account() {
        let store = Arc::new(AccountStore::default());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                thread::spawn(move || store.create_account(&rider_fields("race@x.tn"), Role::Rider))
            })
            .collect();

        let created = handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .filter(Result::is_ok)
            .count();

        assert_eq!(created, 1);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn password_is_not_serialized() {
        let store = AccountStore::default();
        let account = store.create_account(&rider_fields("p@x.tn"), Role::Rider).unwrap();
        let json = serde_json::to_value(&account).unwrap();
        assert!(json.get("password").is_none());
        assert_eq!(json["fullName"], "Test Rider");
    }
}
