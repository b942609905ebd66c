// Copyright 2019-2022 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use super::status_code::Ctap2StatusCode;
use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec::Vec;
use arrayref::array_ref;
use byteorder::{BigEndian, ByteOrder};
use core::convert::TryFrom;
use ctap_cbor as cbor;
use ctap_cbor::{cbor_array_vec, cbor_map, cbor_map_options, destructure_cbor_map};
use p256::ecdsa::VerifyingKey;
use p256::elliptic_curve::sec1::ToEncodedPoint;

pub const EC_FIELD_SIZE: usize = 32;
pub const AAGUID_SIZE: usize = 16;
pub const RP_ID_HASH_SIZE: usize = 32;

// Used as the identifier for ECDSA in assertion signatures and COSE.
pub const ES256_ALGORITHM: i64 = -7;
// Requested in negative tests, no authenticator under test is expected to support it.
pub const RS256_ALGORITHM: i64 = -257;

// https://www.w3.org/TR/webauthn/#dictdef-publickeycredentialrpentity
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublicKeyCredentialRpEntity {
    pub rp_id: String,
    pub rp_name: Option<String>,
    pub rp_icon: Option<String>,
}

impl PublicKeyCredentialRpEntity {
    pub fn new(rp_id: &str) -> Self {
        PublicKeyCredentialRpEntity {
            rp_id: String::from(rp_id),
            rp_name: None,
            rp_icon: None,
        }
    }
}

impl TryFrom<cbor::Value> for PublicKeyCredentialRpEntity {
    type Error = Ctap2StatusCode;

    fn try_from(cbor_value: cbor::Value) -> Result<Self, Ctap2StatusCode> {
        destructure_cbor_map! {
            let {
                "id" => rp_id,
                "icon" => rp_icon,
                "name" => rp_name,
            } = extract_map(cbor_value)?;
        }

        let rp_id = extract_text_string(ok_or_missing(rp_id)?)?;
        let rp_name = rp_name.map(extract_text_string).transpose()?;
        let rp_icon = rp_icon.map(extract_text_string).transpose()?;

        Ok(Self {
            rp_id,
            rp_name,
            rp_icon,
        })
    }
}

impl From<PublicKeyCredentialRpEntity> for cbor::Value {
    fn from(entity: PublicKeyCredentialRpEntity) -> Self {
        cbor_map_options! {
            "id" => entity.rp_id,
            "icon" => entity.rp_icon,
            "name" => entity.rp_name,
        }
    }
}

// https://www.w3.org/TR/webauthn/#dictdef-publickeycredentialuserentity
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublicKeyCredentialUserEntity {
    pub user_id: Vec<u8>,
    pub user_name: Option<String>,
    pub user_display_name: Option<String>,
    pub user_icon: Option<String>,
}

impl PublicKeyCredentialUserEntity {
    pub fn new(user_id: Vec<u8>, user_name: &str) -> Self {
        PublicKeyCredentialUserEntity {
            user_id,
            user_name: Some(String::from(user_name)),
            user_display_name: None,
            user_icon: None,
        }
    }
}

impl TryFrom<cbor::Value> for PublicKeyCredentialUserEntity {
    type Error = Ctap2StatusCode;

    fn try_from(cbor_value: cbor::Value) -> Result<Self, Ctap2StatusCode> {
        destructure_cbor_map! {
            let {
                "id" => user_id,
                "icon" => user_icon,
                "name" => user_name,
                "displayName" => user_display_name,
            } = extract_map(cbor_value)?;
        }

        let user_id = extract_byte_string(ok_or_missing(user_id)?)?;
        let user_name = user_name.map(extract_text_string).transpose()?;
        let user_display_name = user_display_name.map(extract_text_string).transpose()?;
        let user_icon = user_icon.map(extract_text_string).transpose()?;

        Ok(Self {
            user_id,
            user_name,
            user_display_name,
            user_icon,
        })
    }
}

impl From<PublicKeyCredentialUserEntity> for cbor::Value {
    fn from(entity: PublicKeyCredentialUserEntity) -> Self {
        cbor_map_options! {
            "id" => entity.user_id,
            "icon" => entity.user_icon,
            "name" => entity.user_name,
            "displayName" => entity.user_display_name,
        }
    }
}

// https://www.w3.org/TR/webauthn/#enumdef-publickeycredentialtype
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PublicKeyCredentialType {
    PublicKey,
    // This is the default for all strings not covered above.
    // Unknown types should be ignored, instead of returning errors.
    Unknown,
}

impl From<PublicKeyCredentialType> for cbor::Value {
    fn from(cred_type: PublicKeyCredentialType) -> Self {
        match cred_type {
            PublicKeyCredentialType::PublicKey => "public-key",
            PublicKeyCredentialType::Unknown => "unknown",
        }
        .into()
    }
}

impl TryFrom<cbor::Value> for PublicKeyCredentialType {
    type Error = Ctap2StatusCode;

    fn try_from(cbor_value: cbor::Value) -> Result<Self, Ctap2StatusCode> {
        let cred_type_string = extract_text_string(cbor_value)?;
        match &cred_type_string[..] {
            "public-key" => Ok(PublicKeyCredentialType::PublicKey),
            _ => Ok(PublicKeyCredentialType::Unknown),
        }
    }
}

// https://www.w3.org/TR/webauthn/#dictdef-publickeycredentialparameters
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublicKeyCredentialParameter {
    pub cred_type: PublicKeyCredentialType,
    pub alg: i64,
}

impl PublicKeyCredentialParameter {
    pub fn es256() -> Self {
        PublicKeyCredentialParameter {
            cred_type: PublicKeyCredentialType::PublicKey,
            alg: ES256_ALGORITHM,
        }
    }
}

impl TryFrom<cbor::Value> for PublicKeyCredentialParameter {
    type Error = Ctap2StatusCode;

    fn try_from(cbor_value: cbor::Value) -> Result<Self, Ctap2StatusCode> {
        destructure_cbor_map! {
            let {
                "alg" => alg,
                "type" => cred_type,
            } = extract_map(cbor_value)?;
        }

        let cred_type = PublicKeyCredentialType::try_from(ok_or_missing(cred_type)?)?;
        let alg = extract_integer(ok_or_missing(alg)?)?;
        Ok(Self { cred_type, alg })
    }
}

impl From<PublicKeyCredentialParameter> for cbor::Value {
    fn from(cred_param: PublicKeyCredentialParameter) -> Self {
        cbor_map! {
            "alg" => cred_param.alg,
            "type" => cred_param.cred_type,
        }
    }
}

// https://www.w3.org/TR/webauthn/#enumdef-authenticatortransport
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AuthenticatorTransport {
    Usb,
    Nfc,
    Ble,
    Internal,
    // Clients may send transports from later revisions, they are ignored.
    Unknown(String),
}

impl From<AuthenticatorTransport> for cbor::Value {
    fn from(transport: AuthenticatorTransport) -> Self {
        match transport {
            AuthenticatorTransport::Usb => "usb".into(),
            AuthenticatorTransport::Nfc => "nfc".into(),
            AuthenticatorTransport::Ble => "ble".into(),
            AuthenticatorTransport::Internal => "internal".into(),
            AuthenticatorTransport::Unknown(name) => name.into(),
        }
    }
}

impl TryFrom<cbor::Value> for AuthenticatorTransport {
    type Error = Ctap2StatusCode;

    fn try_from(cbor_value: cbor::Value) -> Result<Self, Ctap2StatusCode> {
        let transport_string = extract_text_string(cbor_value)?;
        match &transport_string[..] {
            "usb" => Ok(AuthenticatorTransport::Usb),
            "nfc" => Ok(AuthenticatorTransport::Nfc),
            "ble" => Ok(AuthenticatorTransport::Ble),
            "internal" => Ok(AuthenticatorTransport::Internal),
            _ => Ok(AuthenticatorTransport::Unknown(transport_string)),
        }
    }
}

// https://www.w3.org/TR/webauthn/#dictdef-publickeycredentialdescriptor
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublicKeyCredentialDescriptor {
    pub key_type: PublicKeyCredentialType,
    pub key_id: Vec<u8>,
    pub transports: Option<Vec<AuthenticatorTransport>>,
}

impl PublicKeyCredentialDescriptor {
    pub fn new(key_id: Vec<u8>) -> Self {
        PublicKeyCredentialDescriptor {
            key_type: PublicKeyCredentialType::PublicKey,
            key_id,
            transports: None,
        }
    }
}

impl TryFrom<cbor::Value> for PublicKeyCredentialDescriptor {
    type Error = Ctap2StatusCode;

    fn try_from(cbor_value: cbor::Value) -> Result<Self, Ctap2StatusCode> {
        destructure_cbor_map! {
            let {
                "id" => key_id,
                "type" => key_type,
                "transports" => transports,
            } = extract_map(cbor_value)?;
        }

        let key_type = PublicKeyCredentialType::try_from(ok_or_missing(key_type)?)?;
        let key_id = extract_byte_string(ok_or_missing(key_id)?)?;
        let transports = match transports {
            Some(exclude_entry) => {
                let transport_vec = extract_array(exclude_entry)?;
                let transports = transport_vec
                    .into_iter()
                    .map(AuthenticatorTransport::try_from)
                    .collect::<Result<Vec<AuthenticatorTransport>, Ctap2StatusCode>>()?;
                Some(transports)
            }
            None => None,
        };

        Ok(Self {
            key_type,
            key_id,
            transports,
        })
    }
}

impl From<PublicKeyCredentialDescriptor> for cbor::Value {
    fn from(desc: PublicKeyCredentialDescriptor) -> Self {
        cbor_map_options! {
            "id" => desc.key_id,
            "type" => desc.key_type,
            "transports" => desc.transports.map(|vec| cbor_array_vec!(vec)),
        }
    }
}

/// Options of MakeCredential, without interpretation.
///
/// Which combinations are allowed is decided by the authenticator.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MakeCredentialOptions {
    pub rk: Option<bool>,
    pub up: Option<bool>,
    pub uv: Option<bool>,
}

impl TryFrom<cbor::Value> for MakeCredentialOptions {
    type Error = Ctap2StatusCode;

    fn try_from(cbor_value: cbor::Value) -> Result<Self, Ctap2StatusCode> {
        let options_map = extract_map(cbor_value)?;
        // Unknown options are ignored, but must still have boolean values.
        for option_value in options_map.values() {
            ok_or_cbor_type(option_value.as_bool())?;
        }
        destructure_cbor_map! {
            let {
                "rk" => rk,
                "up" => up,
                "uv" => uv,
            } = options_map;
        }

        Ok(Self {
            rk: rk.map(extract_bool).transpose()?,
            up: up.map(extract_bool).transpose()?,
            uv: uv.map(extract_bool).transpose()?,
        })
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GetAssertionOptions {
    pub rk: Option<bool>,
    pub up: Option<bool>,
    pub uv: Option<bool>,
}

impl TryFrom<cbor::Value> for GetAssertionOptions {
    type Error = Ctap2StatusCode;

    fn try_from(cbor_value: cbor::Value) -> Result<Self, Ctap2StatusCode> {
        let MakeCredentialOptions { rk, up, uv } = MakeCredentialOptions::try_from(cbor_value)?;
        Ok(Self { rk, up, uv })
    }
}

// The COSE key is used for both ECDH and ECDSA public keys for transmission.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CoseKey {
    x_bytes: [u8; EC_FIELD_SIZE],
    y_bytes: [u8; EC_FIELD_SIZE],
    algorithm: i64,
    key_type: i64,
    curve: i64,
}

impl CoseKey {
    // This is the algorithm specifier for ECDH.
    // CTAP requests -25 which represents ECDH-ES + HKDF-256 here:
    // https://www.iana.org/assignments/cose/cose.xhtml#algorithms
    pub const ECDH_ALGORITHM: i64 = -25;
    // The parameter behind map key 1.
    const EC2_KEY_TYPE: i64 = 2;
    // The parameter behind map key -1.
    const P_256_CURVE: i64 = 1;

    fn from_public_key(pk: &p256::PublicKey, algorithm: i64) -> Self {
        let point = pk.to_encoded_point(false);
        let mut x_bytes = [0; EC_FIELD_SIZE];
        let mut y_bytes = [0; EC_FIELD_SIZE];
        // Public keys are never the identity, so uncompressed points have both coordinates.
        if let (Some(x), Some(y)) = (point.x(), point.y()) {
            x_bytes.copy_from_slice(x);
            y_bytes.copy_from_slice(y);
        }
        CoseKey {
            x_bytes,
            y_bytes,
            algorithm,
            key_type: CoseKey::EC2_KEY_TYPE,
            curve: CoseKey::P_256_CURVE,
        }
    }

    pub fn from_ecdh_public_key(pk: &p256::PublicKey) -> Self {
        CoseKey::from_public_key(pk, CoseKey::ECDH_ALGORITHM)
    }

    pub fn from_ecdsa_public_key(pk: &VerifyingKey) -> Self {
        CoseKey::from_public_key(&p256::PublicKey::from(pk), ES256_ALGORITHM)
    }

    pub fn algorithm(&self) -> i64 {
        self.algorithm
    }

    /// Returns the key as a point on P-256, if it is one.
    pub fn to_public_key(&self) -> Result<p256::PublicKey, Ctap2StatusCode> {
        let encoded_point = p256::EncodedPoint::from_affine_coordinates(
            (&self.x_bytes).into(),
            (&self.y_bytes).into(),
            false,
        );
        p256::PublicKey::from_sec1_bytes(encoded_point.as_bytes())
            .map_err(|_| Ctap2StatusCode::CTAP1_ERR_INVALID_PARAMETER)
    }

    pub fn to_verifying_key(&self) -> Result<VerifyingKey, Ctap2StatusCode> {
        if self.algorithm != ES256_ALGORITHM {
            return Err(Ctap2StatusCode::CTAP2_ERR_UNSUPPORTED_ALGORITHM);
        }
        Ok(VerifyingKey::from(self.to_public_key()?))
    }

    /// A fixed key agreement key, for requests that are expected to fail before it is used.
    pub fn example_ecdh_pubkey() -> Self {
        let x_bytes = [
            0x74, 0x4A, 0x48, 0xA0, 0xDC, 0x56, 0x9A, 0x42, 0x0B, 0x3F, 0x58, 0xBF, 0xD8, 0xD9,
            0x62, 0xCF, 0x3A, 0xEA, 0xB1, 0x5A, 0x32, 0x03, 0xC1, 0xA4, 0x23, 0x8B, 0x57, 0x75,
            0x74, 0xA4, 0x29, 0x50,
        ];
        let y_bytes = [
            0xCD, 0x93, 0x26, 0x4A, 0xAF, 0x2A, 0xBA, 0xD1, 0x09, 0x3D, 0x2E, 0xD6, 0x8C, 0xC0,
            0x59, 0xB1, 0xD9, 0xAB, 0xD7, 0x81, 0x71, 0x60, 0x35, 0xFE, 0xFF, 0xE8, 0xE1, 0x94,
            0x05, 0x60, 0xA0, 0xBC,
        ];
        CoseKey {
            x_bytes,
            y_bytes,
            algorithm: CoseKey::ECDH_ALGORITHM,
            key_type: CoseKey::EC2_KEY_TYPE,
            curve: CoseKey::P_256_CURVE,
        }
    }
}

// This conversion accepts both ECDH and ECDSA.
impl TryFrom<cbor::Value> for CoseKey {
    type Error = Ctap2StatusCode;

    fn try_from(cbor_value: cbor::Value) -> Result<Self, Ctap2StatusCode> {
        destructure_cbor_map! {
            let {
                // This is sorted correctly, negative encoding is bigger.
                1 => key_type,
                3 => algorithm,
                -1 => curve,
                -2 => x_bytes,
                -3 => y_bytes,
            } = extract_map(cbor_value)?;
        }

        let algorithm = extract_integer(ok_or_missing(algorithm)?)?;
        let x_bytes = extract_byte_string(ok_or_missing(x_bytes)?)?;
        let y_bytes = extract_byte_string(ok_or_missing(y_bytes)?)?;
        let curve = extract_integer(ok_or_missing(curve)?)?;
        let key_type = extract_integer(ok_or_missing(key_type)?)?;
        if algorithm != CoseKey::ECDH_ALGORITHM && algorithm != ES256_ALGORITHM {
            return Err(Ctap2StatusCode::CTAP2_ERR_UNSUPPORTED_ALGORITHM);
        }
        if x_bytes.len() != EC_FIELD_SIZE || y_bytes.len() != EC_FIELD_SIZE {
            return Err(Ctap2StatusCode::CTAP1_ERR_INVALID_PARAMETER);
        }
        if curve != CoseKey::P_256_CURVE || key_type != CoseKey::EC2_KEY_TYPE {
            return Err(Ctap2StatusCode::CTAP2_ERR_UNSUPPORTED_ALGORITHM);
        }

        Ok(CoseKey {
            x_bytes: *array_ref![x_bytes.as_slice(), 0, EC_FIELD_SIZE],
            y_bytes: *array_ref![y_bytes.as_slice(), 0, EC_FIELD_SIZE],
            algorithm,
            key_type,
            curve,
        })
    }
}

impl From<CoseKey> for cbor::Value {
    fn from(cose_key: CoseKey) -> Self {
        let CoseKey {
            x_bytes,
            y_bytes,
            algorithm,
            key_type,
            curve,
        } = cose_key;

        cbor_map! {
            1 => key_type,
            3 => algorithm,
            -1 => curve,
            -2 => x_bytes.to_vec(),
            -3 => y_bytes.to_vec(),
        }
    }
}

// https://www.w3.org/TR/webauthn/#sec-attested-credential-data
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttestedCredentialData {
    pub aaguid: [u8; AAGUID_SIZE],
    pub credential_id: Vec<u8>,
    pub public_key: CoseKey,
}

// https://www.w3.org/TR/webauthn/#sec-authenticator-data
#[derive(Clone, Debug, PartialEq)]
pub struct AuthenticatorData {
    pub rp_id_hash: [u8; RP_ID_HASH_SIZE],
    pub flags: u8,
    pub sign_count: u32,
    pub attested_credential_data: Option<AttestedCredentialData>,
    pub extensions: Option<cbor::Value>,
}

impl AuthenticatorData {
    pub const UP_FLAG: u8 = 0x01;
    pub const UV_FLAG: u8 = 0x04;
    pub const AT_FLAG: u8 = 0x40;
    pub const ED_FLAG: u8 = 0x80;

    const FIXED_LENGTH: usize = RP_ID_HASH_SIZE + 1 + 4;

    pub fn user_present(&self) -> bool {
        self.flags & AuthenticatorData::UP_FLAG != 0
    }

    pub fn user_verified(&self) -> bool {
        self.flags & AuthenticatorData::UV_FLAG != 0
    }

    /// Parses the byte layout, checking that the flags match the included parts.
    pub fn parse(bytes: &[u8]) -> Result<Self, Ctap2StatusCode> {
        if bytes.len() < AuthenticatorData::FIXED_LENGTH {
            return Err(Ctap2StatusCode::CTAP1_ERR_INVALID_LENGTH);
        }
        let rp_id_hash = *array_ref![bytes, 0, RP_ID_HASH_SIZE];
        let flags = bytes[RP_ID_HASH_SIZE];
        let sign_count = BigEndian::read_u32(&bytes[RP_ID_HASH_SIZE + 1..]);
        let mut remaining = &bytes[AuthenticatorData::FIXED_LENGTH..];

        let attested_credential_data = if flags & AuthenticatorData::AT_FLAG != 0 {
            if remaining.len() < AAGUID_SIZE + 2 {
                return Err(Ctap2StatusCode::CTAP1_ERR_INVALID_LENGTH);
            }
            let aaguid = *array_ref![remaining, 0, AAGUID_SIZE];
            let id_length = BigEndian::read_u16(&remaining[AAGUID_SIZE..]) as usize;
            remaining = &remaining[AAGUID_SIZE + 2..];
            if remaining.len() < id_length {
                return Err(Ctap2StatusCode::CTAP1_ERR_INVALID_LENGTH);
            }
            let credential_id = remaining[..id_length].to_vec();
            let (public_key, rest) = cbor::read_prefix(&remaining[id_length..])?;
            remaining = rest;
            Some(AttestedCredentialData {
                aaguid,
                credential_id,
                public_key: CoseKey::try_from(public_key)?,
            })
        } else {
            None
        };

        let extensions = if flags & AuthenticatorData::ED_FLAG != 0 {
            let (extensions, rest) = cbor::read_prefix(remaining)?;
            remaining = rest;
            Some(extensions)
        } else {
            None
        };

        if !remaining.is_empty() {
            return Err(Ctap2StatusCode::CTAP1_ERR_INVALID_LENGTH);
        }
        Ok(AuthenticatorData {
            rp_id_hash,
            flags,
            sign_count,
            attested_credential_data,
            extensions,
        })
    }

    /// Serializes into the byte layout. Flags for included parts are set automatically.
    pub fn to_bytes(&self) -> Result<Vec<u8>, Ctap2StatusCode> {
        let mut flags = self.flags & !(AuthenticatorData::AT_FLAG | AuthenticatorData::ED_FLAG);
        if self.attested_credential_data.is_some() {
            flags |= AuthenticatorData::AT_FLAG;
        }
        if self.extensions.is_some() {
            flags |= AuthenticatorData::ED_FLAG;
        }
        let mut bytes = self.rp_id_hash.to_vec();
        bytes.push(flags);
        let mut sign_count = [0; 4];
        BigEndian::write_u32(&mut sign_count, self.sign_count);
        bytes.extend_from_slice(&sign_count);
        if let Some(data) = &self.attested_credential_data {
            bytes.extend_from_slice(&data.aaguid);
            let mut id_length = [0; 2];
            let id_length_value = u16::try_from(data.credential_id.len())
                .map_err(|_| Ctap2StatusCode::CTAP2_ERR_VENDOR_INTERNAL_ERROR)?;
            BigEndian::write_u16(&mut id_length, id_length_value);
            bytes.extend_from_slice(&id_length);
            bytes.extend_from_slice(&data.credential_id);
            cbor::write(data.public_key.clone().into(), &mut bytes)
                .map_err(|_| Ctap2StatusCode::CTAP2_ERR_VENDOR_INTERNAL_ERROR)?;
        }
        if let Some(extensions) = &self.extensions {
            cbor::write(extensions.clone(), &mut bytes)
                .map_err(|_| Ctap2StatusCode::CTAP2_ERR_VENDOR_INTERNAL_ERROR)?;
        }
        Ok(bytes)
    }
}

/// The parsed authenticatorMakeCredential response.
#[derive(Clone, Debug, PartialEq)]
pub struct MakeCredentialResponse {
    pub fmt: String,
    pub auth_data: AuthenticatorData,
    pub att_stmt: cbor::Value,
}

impl TryFrom<cbor::Value> for MakeCredentialResponse {
    type Error = Ctap2StatusCode;

    fn try_from(cbor_value: cbor::Value) -> Result<Self, Ctap2StatusCode> {
        destructure_cbor_map! {
            let {
                1 => fmt,
                2 => auth_data,
                3 => att_stmt,
            } = extract_map(cbor_value)?;
        }

        let fmt = extract_text_string(ok_or_missing(fmt)?)?;
        let auth_data = AuthenticatorData::parse(&extract_byte_string(ok_or_missing(auth_data)?)?)?;
        let att_stmt = ok_or_missing(att_stmt)?;
        ok_or_cbor_type(att_stmt.as_map())?;
        Ok(Self {
            fmt,
            auth_data,
            att_stmt,
        })
    }
}

impl MakeCredentialResponse {
    /// Returns the ID of the new credential, if the response attests one.
    pub fn credential_id(&self) -> Option<&[u8]> {
        self.auth_data
            .attested_credential_data
            .as_ref()
            .map(|data| data.credential_id.as_slice())
    }
}

/// The parsed authenticatorGetAssertion response.
#[derive(Clone, Debug, PartialEq)]
pub struct GetAssertionResponse {
    pub credential: Option<PublicKeyCredentialDescriptor>,
    pub auth_data: AuthenticatorData,
    /// The authenticator data as received, which is part of the signed message.
    pub auth_data_bytes: Vec<u8>,
    pub signature: Vec<u8>,
    pub user: Option<PublicKeyCredentialUserEntity>,
    pub number_of_credentials: Option<u64>,
}

impl TryFrom<cbor::Value> for GetAssertionResponse {
    type Error = Ctap2StatusCode;

    fn try_from(cbor_value: cbor::Value) -> Result<Self, Ctap2StatusCode> {
        destructure_cbor_map! {
            let {
                1 => credential,
                2 => auth_data,
                3 => signature,
                4 => user,
                5 => number_of_credentials,
            } = extract_map(cbor_value)?;
        }

        let credential = credential
            .map(PublicKeyCredentialDescriptor::try_from)
            .transpose()?;
        let auth_data_bytes = extract_byte_string(ok_or_missing(auth_data)?)?;
        let auth_data = AuthenticatorData::parse(&auth_data_bytes)?;
        let signature = extract_byte_string(ok_or_missing(signature)?)?;
        let user = user
            .map(PublicKeyCredentialUserEntity::try_from)
            .transpose()?;
        let number_of_credentials = number_of_credentials.map(extract_unsigned).transpose()?;
        Ok(Self {
            credential,
            auth_data,
            auth_data_bytes,
            signature,
            user,
            number_of_credentials,
        })
    }
}

/// The parsed authenticatorGetInfo response.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AuthenticatorInfo {
    pub versions: Vec<String>,
    pub extensions: Vec<String>,
    pub aaguid: Vec<u8>,
    pub options: BTreeMap<String, bool>,
    pub max_msg_size: Option<u64>,
    pub pin_protocols: Vec<u64>,
}

impl TryFrom<cbor::Value> for AuthenticatorInfo {
    type Error = Ctap2StatusCode;

    fn try_from(cbor_value: cbor::Value) -> Result<Self, Ctap2StatusCode> {
        destructure_cbor_map! {
            let {
                1 => versions,
                2 => extensions,
                3 => aaguid,
                4 => options,
                5 => max_msg_size,
                6 => pin_protocols,
            } = extract_map(cbor_value)?;
        }

        let versions = extract_text_array(ok_or_missing(versions)?)?;
        let extensions = extensions
            .map(extract_text_array)
            .transpose()?
            .unwrap_or_default();
        let aaguid = extract_byte_string(ok_or_missing(aaguid)?)?;
        let mut option_map = BTreeMap::new();
        if let Some(options) = options {
            for (key, value) in extract_map(options)? {
                let key = extract_text_string(cbor::Value::KeyValue(key))?;
                option_map.insert(key, extract_bool(value)?);
            }
        }
        let max_msg_size = max_msg_size.map(extract_unsigned).transpose()?;
        let pin_protocols = match pin_protocols {
            Some(pin_protocols) => extract_array(pin_protocols)?
                .into_iter()
                .map(extract_unsigned)
                .collect::<Result<Vec<u64>, Ctap2StatusCode>>()?,
            None => Vec::new(),
        };
        Ok(Self {
            versions,
            extensions,
            aaguid,
            options: option_map,
            max_msg_size,
            pin_protocols,
        })
    }
}

impl AuthenticatorInfo {
    /// Returns the advertised value of an option, absent options are `None`.
    pub fn option(&self, name: &str) -> Option<bool> {
        self.options.get(name).copied()
    }

    pub fn is_fido_2_1_compliant(&self) -> bool {
        self.versions.iter().any(|version| version == "FIDO_2_1")
    }

    pub fn has_uv_option(&self) -> bool {
        self.option("uv").unwrap_or(false)
    }

    pub fn supports_extension(&self, name: &str) -> bool {
        self.extensions.iter().any(|extension| extension == name)
    }

    pub fn is_hmac_secret_supported(&self) -> bool {
        self.supports_extension("hmac-secret")
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClientPinSubCommand {
    GetPinRetries = 0x01,
    GetKeyAgreement = 0x02,
    SetPin = 0x03,
    ChangePin = 0x04,
    GetPinToken = 0x05,
    GetPinUvAuthTokenUsingUvWithPermissions = 0x06,
    GetUvRetries = 0x07,
}

impl From<ClientPinSubCommand> for cbor::Value {
    fn from(subcommand: ClientPinSubCommand) -> Self {
        (subcommand as u64).into()
    }
}

impl TryFrom<cbor::Value> for ClientPinSubCommand {
    type Error = Ctap2StatusCode;

    fn try_from(cbor_value: cbor::Value) -> Result<Self, Ctap2StatusCode> {
        let subcommand_int = extract_unsigned(cbor_value)?;
        match subcommand_int {
            0x01 => Ok(ClientPinSubCommand::GetPinRetries),
            0x02 => Ok(ClientPinSubCommand::GetKeyAgreement),
            0x03 => Ok(ClientPinSubCommand::SetPin),
            0x04 => Ok(ClientPinSubCommand::ChangePin),
            0x05 => Ok(ClientPinSubCommand::GetPinToken),
            0x06 => Ok(ClientPinSubCommand::GetPinUvAuthTokenUsingUvWithPermissions),
            0x07 => Ok(ClientPinSubCommand::GetUvRetries),
            _ => Err(Ctap2StatusCode::CTAP2_ERR_INVALID_SUBCOMMAND),
        }
    }
}

/// The parsed authenticatorClientPIN response. Which fields are present depends on the subcommand.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClientPinResponse {
    pub key_agreement: Option<CoseKey>,
    pub pin_token: Option<Vec<u8>>,
    pub retries: Option<u64>,
}

impl TryFrom<cbor::Value> for ClientPinResponse {
    type Error = Ctap2StatusCode;

    fn try_from(cbor_value: cbor::Value) -> Result<Self, Ctap2StatusCode> {
        destructure_cbor_map! {
            let {
                1 => key_agreement,
                2 => pin_token,
                3 => retries,
            } = extract_map(cbor_value)?;
        }

        Ok(Self {
            key_agreement: key_agreement.map(CoseKey::try_from).transpose()?,
            pin_token: pin_token.map(extract_byte_string).transpose()?,
            retries: retries.map(extract_unsigned).transpose()?,
        })
    }
}

impl From<ClientPinResponse> for cbor::Value {
    fn from(response: ClientPinResponse) -> Self {
        cbor_map_options! {
            1 => response.key_agreement,
            2 => response.pin_token,
            3 => response.retries,
        }
    }
}

fn ok_or_cbor_type<T>(value_option: Option<T>) -> Result<T, Ctap2StatusCode> {
    value_option.ok_or(Ctap2StatusCode::CTAP2_ERR_CBOR_UNEXPECTED_TYPE)
}

pub fn extract_unsigned(cbor_value: cbor::Value) -> Result<u64, Ctap2StatusCode> {
    ok_or_cbor_type(cbor_value.as_unsigned())
}

pub fn extract_integer(cbor_value: cbor::Value) -> Result<i64, Ctap2StatusCode> {
    ok_or_cbor_type(cbor_value.as_integer())
}

pub fn extract_byte_string(cbor_value: cbor::Value) -> Result<Vec<u8>, Ctap2StatusCode> {
    match cbor_value {
        cbor::Value::KeyValue(cbor::KeyType::ByteString(byte_string)) => Ok(byte_string),
        _ => Err(Ctap2StatusCode::CTAP2_ERR_CBOR_UNEXPECTED_TYPE),
    }
}

pub fn extract_text_string(cbor_value: cbor::Value) -> Result<String, Ctap2StatusCode> {
    match cbor_value {
        cbor::Value::KeyValue(cbor::KeyType::TextString(text_string)) => Ok(text_string),
        _ => Err(Ctap2StatusCode::CTAP2_ERR_CBOR_UNEXPECTED_TYPE),
    }
}

pub fn extract_array(cbor_value: cbor::Value) -> Result<Vec<cbor::Value>, Ctap2StatusCode> {
    match cbor_value {
        cbor::Value::Array(array) => Ok(array),
        _ => Err(Ctap2StatusCode::CTAP2_ERR_CBOR_UNEXPECTED_TYPE),
    }
}

pub fn extract_map(
    cbor_value: cbor::Value,
) -> Result<BTreeMap<cbor::KeyType, cbor::Value>, Ctap2StatusCode> {
    match cbor_value {
        cbor::Value::Map(map) => Ok(map),
        _ => Err(Ctap2StatusCode::CTAP2_ERR_CBOR_UNEXPECTED_TYPE),
    }
}

pub fn extract_bool(cbor_value: cbor::Value) -> Result<bool, Ctap2StatusCode> {
    ok_or_cbor_type(cbor_value.as_bool())
}

fn extract_text_array(cbor_value: cbor::Value) -> Result<Vec<String>, Ctap2StatusCode> {
    extract_array(cbor_value)?
        .into_iter()
        .map(extract_text_string)
        .collect()
}

pub fn ok_or_missing<T>(value_option: Option<T>) -> Result<T, Ctap2StatusCode> {
    value_option.ok_or(Ctap2StatusCode::CTAP2_ERR_MISSING_PARAMETER)
}
