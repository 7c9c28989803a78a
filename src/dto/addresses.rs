use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{models::Address, status::AddressType};

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateAddressRequest {
    pub address_type: AddressType,
    pub street_address: String,
    pub apartment_address: Option<String>,
    pub city: String,
    pub state: String,
    pub country: String,
    pub postal_code: String,
    #[serde(default)]
    pub is_default: bool,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateAddressRequest {
    pub address_type: Option<AddressType>,
    pub street_address: Option<String>,
    pub apartment_address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub postal_code: Option<String>,
    pub is_default: Option<bool>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AddressList {
    pub items: Vec<Address>,
}
