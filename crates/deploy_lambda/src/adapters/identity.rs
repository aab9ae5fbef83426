use deploy_core::naming::AccountRegion;

pub trait IdentityService {
    fn current_account_and_region(&self) -> Result<AccountRegion, String>;
}
