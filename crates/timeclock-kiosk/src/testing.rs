//! Scripted stand-in for the server API.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use timeclock_core::wire::{
    PairResponse, PhotoUploadResponse, PunchRequest, PunchResponse, PunchStatus, RevokeResponse,
    StatusResponse,
};
use timeclock_core::{ErrorCode, Tunables};

use crate::client::{ClientError, DeviceAuth, KioskApi, PhotoSubmission};

pub struct FakeApi {
    online: AtomicBool,
    pub tunables: Mutex<Tunables>,
    punches: Mutex<VecDeque<Result<PunchResponse, ClientError>>>,
    photos: Mutex<VecDeque<Result<PhotoUploadResponse, ClientError>>>,
    sent: Mutex<Vec<PunchRequest>>,
    pub uploaded: Mutex<Vec<String>>,
    pairings: Mutex<VecDeque<Result<PairResponse, ClientError>>>,
}

impl FakeApi {
    pub fn new() -> Self {
        Self {
            online: AtomicBool::new(true),
            tunables: Mutex::new(Tunables::default()),
            punches: Mutex::new(VecDeque::new()),
            photos: Mutex::new(VecDeque::new()),
            sent: Mutex::new(Vec::new()),
            uploaded: Mutex::new(Vec::new()),
            pairings: Mutex::new(VecDeque::new()),
        }
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    pub fn script_punch(&self, result: Result<PunchResponse, ClientError>) {
        self.punches.lock().unwrap().push_back(result);
    }

    pub fn script_pair(&self, result: Result<PairResponse, ClientError>) {
        self.pairings.lock().unwrap().push_back(result);
    }

    pub fn script_photo(&self, result: Result<PhotoUploadResponse, ClientError>) {
        self.photos.lock().unwrap().push_back(result);
    }

    pub fn sent(&self) -> Vec<PunchRequest> {
        self.sent.lock().unwrap().clone()
    }

    fn check_online(&self) -> Result<(), ClientError> {
        if self.online.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ClientError::Network("connection refused".to_string()))
        }
    }
}

pub fn processed() -> PunchResponse {
    PunchResponse {
        status: PunchStatus::Processed,
        error: None,
        message: Some("Clocked in.".to_string()),
        employee_name: Some("Ada".to_string()),
        shift_id: Some(1),
        effective_time: Some(1_700_000_000),
    }
}

pub fn rejected(code: ErrorCode) -> PunchResponse {
    PunchResponse {
        status: PunchStatus::Error,
        error: Some(code),
        message: Some(code.user_message().to_string()),
        employee_name: None,
        shift_id: None,
        effective_time: None,
    }
}

pub fn api_error(code: ErrorCode) -> ClientError {
    ClientError::Api {
        status: 400,
        code,
        message: code.user_message().to_string(),
    }
}

impl KioskApi for FakeApi {
    async fn ping(&self) -> Result<(), ClientError> {
        self.check_online()
    }

    async fn status(&self, _kiosk_code: &str) -> Result<StatusResponse, ClientError> {
        self.check_online()?;
        Ok(StatusResponse {
            paired: true,
            pairing_version: Some(1),
            settings: self.tunables.lock().unwrap().clone(),
        })
    }

    async fn pair(&self, _kiosk_code: &str, _pairing_code: &str) -> Result<PairResponse, ClientError> {
        self.check_online()?;
        self.pairings
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ClientError::Config("not scripted".to_string())))
    }

    async fn revoke(&self, _kiosk_code: &str, manager_pin: &str) -> Result<RevokeResponse, ClientError> {
        self.check_online()?;
        if manager_pin == "0000" {
            Ok(RevokeResponse { pairing_version: 2 })
        } else {
            Err(api_error(ErrorCode::InvalidManagerPin))
        }
    }

    async fn punch(
        &self,
        _auth: &DeviceAuth<'_>,
        request: &PunchRequest,
    ) -> Result<PunchResponse, ClientError> {
        self.check_online()?;
        self.sent.lock().unwrap().push(request.clone());
        self.punches.lock().unwrap().pop_front().unwrap_or_else(|| Ok(processed()))
    }

    async fn upload_photo(
        &self,
        _auth: &DeviceAuth<'_>,
        photo: &PhotoSubmission<'_>,
    ) -> Result<PhotoUploadResponse, ClientError> {
        self.check_online()?;
        self.uploaded.lock().unwrap().push(photo.event_uuid.to_string());
        self.photos.lock().unwrap().pop_front().unwrap_or_else(|| {
            Ok(PhotoUploadResponse {
                status: "ok".to_string(),
                event_uuid: photo.event_uuid.to_string(),
            })
        })
    }
}
