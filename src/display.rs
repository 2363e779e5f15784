/// Direct display brightness queries
///
/// Tries every `IODisplayConnect` service IOKit matches and takes the first one that answers
/// the `brightness` parameter. Built-in panels on Apple Silicon do not expose that service,
/// so the main display is then asked through the DisplayServices private framework, which is
/// loaded lazily and may be missing altogether.

#[cfg(target_os = "macos")]
pub mod macos {
    use std::ffi::c_void;
    use std::sync::OnceLock;

    use core_foundation::base::TCFType;
    use core_foundation::string::{CFString, CFStringRef};
    use core_graphics::display::CGDisplay;

    use crate::brightness::BrightnessSource;
    use crate::error::{SignalError, SignalResult};

    type IoObject = u32;
    type KernReturn = i32;

    const IO_MAIN_PORT_DEFAULT: u32 = 0;
    const IO_OBJECT_NULL: IoObject = 0;

    // FFI declarations for IOKit display services
    #[link(name = "IOKit", kind = "framework")]
    extern "C" {
        fn IOServiceMatching(name: *const libc::c_char) -> *mut c_void;
        fn IOServiceGetMatchingServices(
            main_port: u32,
            matching: *mut c_void,
            existing: *mut IoObject,
        ) -> KernReturn;
        fn IOIteratorNext(iterator: IoObject) -> IoObject;
        fn IOObjectRelease(object: IoObject) -> KernReturn;
        fn IODisplayGetFloatParameter(
            service: IoObject,
            options: u32,
            parameter_name: CFStringRef,
            value: *mut f32,
        ) -> KernReturn;
    }

    type GetBrightnessFn = unsafe extern "C" fn(display: u32, brightness: *mut f32) -> i32;

    const DISPLAY_SERVICES_PATH: &[u8] =
        b"/System/Library/PrivateFrameworks/DisplayServices.framework/DisplayServices\0";
    const GET_BRIGHTNESS_SYMBOL: &[u8] = b"DisplayServicesGetBrightness\0";

    fn display_services_get_brightness() -> Option<GetBrightnessFn> {
        static SYMBOL: OnceLock<Option<GetBrightnessFn>> = OnceLock::new();

        *SYMBOL.get_or_init(|| unsafe {
            let handle = libc::dlopen(DISPLAY_SERVICES_PATH.as_ptr() as *const libc::c_char, libc::RTLD_LAZY);
            if handle.is_null() {
                tracing::debug!("DisplayServices framework not available");
                return None;
            }
            let symbol = libc::dlsym(handle, GET_BRIGHTNESS_SYMBOL.as_ptr() as *const libc::c_char);
            if symbol.is_null() {
                tracing::debug!("DisplayServicesGetBrightness not exported");
                return None;
            }
            Some(std::mem::transmute::<*mut c_void, GetBrightnessFn>(symbol))
        })
    }

    pub struct DisplayBrightness {
        parameter: CFString,
    }

    impl Default for DisplayBrightness {
        fn default() -> Self {
            Self::new()
        }
    }

    impl DisplayBrightness {
        pub fn new() -> Self {
            DisplayBrightness {
                parameter: CFString::from_static_string("brightness"),
            }
        }

        fn read_iokit(&self) -> Option<f32> {
            let matching = unsafe { IOServiceMatching(b"IODisplayConnect\0".as_ptr() as *const libc::c_char) };
            if matching.is_null() {
                return None;
            }

            // IOServiceGetMatchingServices consumes the matching dictionary
            let mut iterator: IoObject = IO_OBJECT_NULL;
            let status = unsafe { IOServiceGetMatchingServices(IO_MAIN_PORT_DEFAULT, matching, &mut iterator) };
            if status != 0 {
                return None;
            }

            let mut found = None;
            loop {
                let service = unsafe { IOIteratorNext(iterator) };
                if service == IO_OBJECT_NULL {
                    break;
                }

                let mut value = 0.0f32;
                let status = unsafe {
                    IODisplayGetFloatParameter(service, 0, self.parameter.as_concrete_TypeRef(), &mut value)
                };
                unsafe { IOObjectRelease(service) };

                if status == 0 {
                    found = Some(value);
                    break;
                }
            }
            unsafe { IOObjectRelease(iterator) };

            found
        }

        fn read_display_services(&self) -> Option<f32> {
            let get_brightness = display_services_get_brightness()?;
            let display = CGDisplay::main().id;

            let mut value = 0.0f32;
            let status = unsafe { get_brightness(display, &mut value) };
            (status == 0).then_some(value)
        }
    }

    impl BrightnessSource for DisplayBrightness {
        fn read_brightness(&self) -> SignalResult<f32> {
            self.read_iokit()
                .or_else(|| self.read_display_services())
                .ok_or(SignalError::QueryUnsupported)
        }
    }
}

#[cfg(not(target_os = "macos"))]
pub mod macos {
    use crate::brightness::BrightnessSource;
    use crate::error::{SignalError, SignalResult};

    #[derive(Debug, Default)]
    pub struct DisplayBrightness;

    impl DisplayBrightness {
        pub fn new() -> Self {
            DisplayBrightness
        }
    }

    impl BrightnessSource for DisplayBrightness {
        fn read_brightness(&self) -> SignalResult<f32> {
            Err(SignalError::QueryUnsupported)
        }
    }
}
