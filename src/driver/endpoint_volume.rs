//! Endpoint mute flag.
//!
//! On Windows this goes through `IAudioEndpointVolume`, looking the endpoint
//! up by friendly name among the active render endpoints. Other platforms
//! have no per-endpoint mute and report `Unsupported`.

#[cfg(not(windows))]
use crate::DriverError;

#[cfg(windows)]
pub(crate) use windows_impl::{is_muted, set_muted};

#[cfg(not(windows))]
pub(crate) fn is_muted(_name: &str) -> Result<bool, DriverError> {
    Err(DriverError::unsupported("endpoint mute on this platform"))
}

#[cfg(not(windows))]
pub(crate) fn set_muted(_name: &str, _muted: bool) -> Result<(), DriverError> {
    Err(DriverError::unsupported("endpoint mute on this platform"))
}

#[cfg(windows)]
#[allow(unsafe_code)]
mod windows_impl {
    use windows::Win32::Devices::FunctionDiscovery::PKEY_Device_FriendlyName;
    use windows::Win32::Foundation::BOOL;
    use windows::Win32::Media::Audio::Endpoints::IAudioEndpointVolume;
    use windows::Win32::Media::Audio::{
        eRender, IMMDevice, IMMDeviceEnumerator, MMDeviceEnumerator, DEVICE_STATE_ACTIVE,
    };
    use windows::Win32::System::Com::StructuredStorage::PropVariantClear;
    use windows::Win32::System::Com::{
        CoCreateInstance, CoInitializeEx, CoUninitialize, CLSCTX_ALL, COINIT_MULTITHREADED,
        STGM_READ,
    };

    use crate::DriverError;

    impl From<windows::core::Error> for DriverError {
        fn from(err: windows::core::Error) -> Self {
            DriverError::native(err.code().0, err.message().to_string())
        }
    }

    /// Balances a successful `CoInitializeEx` on this thread.
    struct ComScope {
        initialized: bool,
    }

    impl ComScope {
        fn enter() -> Self {
            // SAFETY: no reserved pointer; an already initialized apartment is fine
            let initialized = unsafe { CoInitializeEx(None, COINIT_MULTITHREADED) }.is_ok();
            Self { initialized }
        }
    }

    impl Drop for ComScope {
        fn drop(&mut self) {
            if self.initialized {
                // SAFETY: paired with the successful CoInitializeEx above
                unsafe { CoUninitialize() };
            }
        }
    }

    fn friendly_name(device: &IMMDevice) -> windows::core::Result<Option<String>> {
        // SAFETY: COM calls on a live device; the PROPVARIANT is cleared before return
        unsafe {
            let store = device.OpenPropertyStore(STGM_READ)?;
            let mut value = store.GetValue(&PKEY_Device_FriendlyName)?;
            let text = value.Anonymous.Anonymous.Anonymous.pwszVal;
            let name = if text.is_null() {
                None
            } else {
                text.to_string().ok()
            };
            PropVariantClear(&mut value)?;
            Ok(name)
        }
    }

    fn find_render_endpoint(
        enumerator: &IMMDeviceEnumerator,
        name: &str,
    ) -> Result<IMMDevice, DriverError> {
        // SAFETY: COM calls on a live enumerator
        let devices = unsafe { enumerator.EnumAudioEndpoints(eRender, DEVICE_STATE_ACTIVE) }?;
        let count = unsafe { devices.GetCount() }?;

        for index in 0..count {
            let device = unsafe { devices.Item(index) }?;
            if friendly_name(&device)?.as_deref() == Some(name) {
                return Ok(device);
            }
        }

        Err(DriverError::backend(format!(
            "no active render endpoint named '{name}'"
        )))
    }

    pub(crate) fn is_muted(name: &str) -> Result<bool, DriverError> {
        with_endpoint_volume(name, |volume| {
            // SAFETY: COM call on a live interface pointer
            let muted = unsafe { volume.GetMute() }?;
            Ok(muted.as_bool())
        })
    }

    pub(crate) fn set_muted(name: &str, muted: bool) -> Result<(), DriverError> {
        with_endpoint_volume(name, |volume| {
            // SAFETY: COM call on a live interface pointer; no event context
            unsafe { volume.SetMute(BOOL::from(muted), std::ptr::null()) }
        })
    }

    fn with_endpoint_volume<T>(
        name: &str,
        f: impl FnOnce(&IAudioEndpointVolume) -> windows::core::Result<T>,
    ) -> Result<T, DriverError> {
        let _com = ComScope::enter();

        // SAFETY: COM is initialized for this thread by `_com`
        let enumerator: IMMDeviceEnumerator =
            unsafe { CoCreateInstance(&MMDeviceEnumerator, None, CLSCTX_ALL) }?;
        let device = find_render_endpoint(&enumerator, name)?;
        let volume: IAudioEndpointVolume = unsafe { device.Activate(CLSCTX_ALL, None) }?;

        Ok(f(&volume)?)
    }
}
