/// Listen-only event tap for system-defined key events (brightness and media keys)
///
/// The tap sits at the HID layer when the process may install one there, otherwise at the
/// session layer. Either way it needs Input Monitoring / Accessibility access; without it
/// installation fails and the brightness watcher runs on polling alone.

#[cfg(target_os = "macos")]
pub mod macos {
    use std::cell::Cell;
    use std::ffi::c_void;
    use std::ptr;

    use cocoa::base::{id, nil};
    use core_foundation::base::TCFType;
    use core_foundation::mach_port::{CFMachPort, CFMachPortRef};
    use core_foundation::runloop::{kCFRunLoopCommonModes, CFRunLoop, CFRunLoopSource};
    use core_graphics::event::{CGEventTapLocation, CGEventTapOptions, CGEventTapPlacement};
    use objc::{class, msg_send, sel, sel_impl};

    use crate::constants::system_event::NX_SYSDEFINED;
    use crate::dispatcher::{LoopEvent, LoopNotifier};
    use crate::error::{SignalError, SignalResult};
    use crate::intercept::{decode_system_event, HardwareKey, KeyIntercept};

    const TAP_DISABLED_BY_TIMEOUT: u32 = 0xFFFF_FFFE;
    const TAP_DISABLED_BY_USER_INPUT: u32 = 0xFFFF_FFFF;

    type TapCallback = unsafe extern "C" fn(
        proxy: *mut c_void,
        event_type: u32,
        event: *mut c_void,
        user_info: *mut c_void,
    ) -> *mut c_void;

    // FFI declarations for event taps; core-graphics' safe wrapper cannot express the
    // system-defined event mask
    #[link(name = "CoreGraphics", kind = "framework")]
    extern "C" {
        fn CGEventTapCreate(
            tap: CGEventTapLocation,
            place: CGEventTapPlacement,
            options: CGEventTapOptions,
            events_of_interest: u64,
            callback: TapCallback,
            user_info: *mut c_void,
        ) -> CFMachPortRef;
        fn CGEventTapEnable(tap: CFMachPortRef, enable: bool);
    }

    #[link(name = "CoreFoundation", kind = "framework")]
    extern "C" {
        fn CFMachPortInvalidate(port: CFMachPortRef);
    }

    struct TapContext {
        notifier: LoopNotifier,
        port: Cell<CFMachPortRef>,
    }

    /// Pull subtype and data1 out of an NSSystemDefined CGEvent
    unsafe fn decode_cg_event(event: *mut c_void) -> Option<HardwareKey> {
        objc::rc::autoreleasepool(|| unsafe {
            let ns_event: id = msg_send![class!(NSEvent), eventWithCGEvent: event];
            if ns_event == nil {
                return None;
            }
            let subtype: i16 = msg_send![ns_event, subtype];
            let data1: isize = msg_send![ns_event, data1];
            decode_system_event(subtype, data1 as i64)
        })
    }

    unsafe extern "C" fn tap_callback(
        _proxy: *mut c_void,
        event_type: u32,
        event: *mut c_void,
        user_info: *mut c_void,
    ) -> *mut c_void {
        let context = unsafe { &*(user_info as *const TapContext) };

        match event_type {
            TAP_DISABLED_BY_TIMEOUT | TAP_DISABLED_BY_USER_INPUT => {
                tracing::debug!("Event tap disabled by the system ({:#x}), re-enabling", event_type);
                let port = context.port.get();
                if !port.is_null() {
                    unsafe { CGEventTapEnable(port, true) };
                }
            }
            NX_SYSDEFINED => {
                if let Some(key) = unsafe { decode_cg_event(event) } {
                    context.notifier.notify(LoopEvent::HardwareKey(key));
                }
            }
            _ => {}
        }

        // Listen-only: the event passes through untouched
        event
    }

    /// Installs a listen-only tap on the current thread's run loop
    #[derive(Debug, Default)]
    pub struct SystemEventTap;

    impl SystemEventTap {
        pub fn new() -> Self {
            SystemEventTap
        }
    }

    /// Live tap; disabled, detached from the run loop and invalidated on drop
    pub struct EventTapGuard {
        port: CFMachPort,
        source: CFRunLoopSource,
        run_loop: CFRunLoop,
        context: *mut TapContext,
    }

    impl KeyIntercept for SystemEventTap {
        type Guard = EventTapGuard;

        fn install(&self, notifier: LoopNotifier) -> SignalResult<EventTapGuard> {
            let context = Box::into_raw(Box::new(TapContext {
                notifier,
                port: Cell::new(ptr::null_mut()),
            }));
            let mask = 1u64 << NX_SYSDEFINED;

            let mut raw_port: CFMachPortRef = ptr::null_mut();
            for location in [CGEventTapLocation::HID, CGEventTapLocation::Session] {
                raw_port = unsafe {
                    CGEventTapCreate(
                        location,
                        CGEventTapPlacement::HeadInsertEventTap,
                        CGEventTapOptions::ListenOnly,
                        mask,
                        tap_callback,
                        context as *mut c_void,
                    )
                };
                if !raw_port.is_null() {
                    break;
                }
            }

            if raw_port.is_null() {
                unsafe { drop(Box::from_raw(context)) };
                return Err(SignalError::InterceptUnavailable(
                    "CGEventTapCreate refused; grant Input Monitoring access in System Settings".to_string(),
                ));
            }

            let port = unsafe { CFMachPort::wrap_under_create_rule(raw_port) };
            let source = match port.create_runloop_source(0) {
                Ok(source) => source,
                Err(()) => {
                    unsafe {
                        CFMachPortInvalidate(raw_port);
                        drop(Box::from_raw(context));
                    }
                    return Err(SignalError::InterceptUnavailable(
                        "could not create run loop source for event tap".to_string(),
                    ));
                }
            };

            unsafe { (*context).port.set(raw_port) };

            let run_loop = CFRunLoop::get_current();
            run_loop.add_source(&source, unsafe { kCFRunLoopCommonModes });
            unsafe { CGEventTapEnable(raw_port, true) };

            Ok(EventTapGuard {
                port,
                source,
                run_loop,
                context,
            })
        }
    }

    impl Drop for EventTapGuard {
        fn drop(&mut self) {
            let raw_port = self.port.as_concrete_TypeRef();
            unsafe { CGEventTapEnable(raw_port, false) };
            self.run_loop.remove_source(&self.source, unsafe { kCFRunLoopCommonModes });
            unsafe {
                CFMachPortInvalidate(raw_port);
                drop(Box::from_raw(self.context));
            }
        }
    }
}

#[cfg(not(target_os = "macos"))]
pub mod macos {
    use crate::dispatcher::LoopNotifier;
    use crate::error::{SignalError, SignalResult};
    use crate::intercept::KeyIntercept;

    #[derive(Debug, Default)]
    pub struct SystemEventTap;

    impl SystemEventTap {
        pub fn new() -> Self {
            SystemEventTap
        }
    }

    impl KeyIntercept for SystemEventTap {
        type Guard = ();

        fn install(&self, _notifier: LoopNotifier) -> SignalResult<()> {
            Err(SignalError::InterceptUnavailable(
                "key interception is only supported on macOS".to_string(),
            ))
        }
    }
}
