//! CryptoAPI system store backend
//!
//! Stores are opened read-only and must already exist. Enumeration hands out
//! duplicated certificate contexts so each entry stays valid independently of
//! the enumeration cursor; all of them borrow the store and are freed on drop.

use std::ffi::c_void;
use std::io;
use std::marker::PhantomData;
use std::ptr;

use windows_sys::Win32::Security::Cryptography::{
    BCRYPT_PRIVATE_KEY_BLOB, CERT_CONTEXT, CERT_FRIENDLY_NAME_PROP_ID, CERT_KEY_PROV_INFO_PROP_ID,
    CERT_NCRYPT_KEY_SPEC, CERT_STORE_ADD_ALWAYS, CERT_STORE_CREATE_NEW_FLAG,
    CERT_STORE_OPEN_EXISTING_FLAG, CERT_STORE_PROV_MEMORY, CERT_STORE_PROV_SYSTEM_W,
    CERT_STORE_READONLY_FLAG, CERT_SYSTEM_STORE_CURRENT_SERVICE_ID,
    CERT_SYSTEM_STORE_CURRENT_USER_GROUP_POLICY_ID, CERT_SYSTEM_STORE_CURRENT_USER_ID,
    CERT_SYSTEM_STORE_LOCAL_MACHINE_ENTERPRISE_ID, CERT_SYSTEM_STORE_LOCAL_MACHINE_GROUP_POLICY_ID,
    CERT_SYSTEM_STORE_LOCAL_MACHINE_ID, CERT_SYSTEM_STORE_LOCATION_SHIFT,
    CERT_SYSTEM_STORE_SERVICES_ID, CERT_SYSTEM_STORE_USERS_ID, CRYPT_ACQUIRE_ALLOW_NCRYPT_KEY_FLAG,
    CRYPT_ACQUIRE_SILENT_FLAG, CRYPT_INTEGER_BLOB, CertAddCertificateContextToStore,
    CertCloseStore, CertDuplicateCertificateContext, CertEnumCertificatesInStore,
    CertFreeCertificateContext, CertGetCertificateContextProperty, CertOpenStore,
    CryptAcquireCertificatePrivateKey, CryptDestroyKey, CryptExportKey, CryptGetUserKey,
    CryptReleaseContext, EXPORT_PRIVATE_KEYS, HCERTSTORE, NCryptExportKey, NCryptFreeObject,
    PFXExportCertStoreEx, PRIVATEKEYBLOB, REPORT_NOT_ABLE_TO_EXPORT_PRIVATE_KEY,
};
use zeroize::Zeroizing;

use super::{CertificateStore, NativeCertificate, Principal, StoreProvider, StoreScope};

fn location_id(principal: Principal) -> u32 {
    match principal {
        Principal::CurrentUser => CERT_SYSTEM_STORE_CURRENT_USER_ID,
        Principal::LocalMachine => CERT_SYSTEM_STORE_LOCAL_MACHINE_ID,
        Principal::CurrentService => CERT_SYSTEM_STORE_CURRENT_SERVICE_ID,
        Principal::Services => CERT_SYSTEM_STORE_SERVICES_ID,
        Principal::Users => CERT_SYSTEM_STORE_USERS_ID,
        Principal::CurrentUserGroupPolicy => CERT_SYSTEM_STORE_CURRENT_USER_GROUP_POLICY_ID,
        Principal::LocalMachineGroupPolicy => CERT_SYSTEM_STORE_LOCAL_MACHINE_GROUP_POLICY_ID,
        Principal::LocalMachineEnterprise => CERT_SYSTEM_STORE_LOCAL_MACHINE_ENTERPRISE_ID,
    }
}

fn wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(Some(0)).collect()
}

/// The operating system's registered certificate stores.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemStores;

impl SystemStores {
    pub fn new() -> Self {
        Self
    }
}

impl StoreProvider for SystemStores {
    type Store<'p>
        = SystemStore
    where
        Self: 'p;

    fn open_store(&self, scope: &StoreScope) -> io::Result<SystemStore> {
        let name = wide(&scope.store_name);
        let flags = (location_id(scope.principal) << CERT_SYSTEM_STORE_LOCATION_SHIFT)
            | CERT_STORE_READONLY_FLAG
            | CERT_STORE_OPEN_EXISTING_FLAG;

        // SAFETY: `name` is NUL-terminated and outlives the call.
        let handle = unsafe {
            CertOpenStore(
                CERT_STORE_PROV_SYSTEM_W,
                0,
                0,
                flags,
                name.as_ptr() as *const c_void,
            )
        };

        if handle.is_null() {
            return Err(io::Error::last_os_error());
        }

        Ok(SystemStore { handle })
    }
}

/// An open system store. Closed on drop.
pub struct SystemStore {
    handle: HCERTSTORE,
}

impl CertificateStore for SystemStore {
    type Certificate<'a>
        = SystemCertificate<'a>
    where
        Self: 'a;

    fn certificates(&self) -> impl Iterator<Item = SystemCertificate<'_>> + '_ {
        SystemCertificates {
            store: self,
            cursor: ptr::null(),
            done: self.handle.is_null(),
        }
    }

    fn close(&mut self) {
        if self.handle.is_null() {
            return;
        }
        // SAFETY: the handle came from CertOpenStore and is closed exactly once.
        unsafe {
            CertCloseStore(self.handle, 0);
        }
        self.handle = ptr::null_mut();
    }
}

impl Drop for SystemStore {
    fn drop(&mut self) {
        self.close();
    }
}

struct SystemCertificates<'s> {
    store: &'s SystemStore,
    cursor: *const CERT_CONTEXT,
    done: bool,
}

impl<'s> Iterator for SystemCertificates<'s> {
    type Item = SystemCertificate<'s>;

    fn next(&mut self) -> Option<SystemCertificate<'s>> {
        if self.done {
            return None;
        }

        // SAFETY: CertEnumCertificatesInStore frees the previous cursor context.
        let next = unsafe { CertEnumCertificatesInStore(self.store.handle, self.cursor) };
        if next.is_null() {
            self.cursor = ptr::null();
            self.done = true;
            return None;
        }
        self.cursor = next;

        // SAFETY: `next` is a valid context; the duplicate is freed by SystemCertificate.
        let context = unsafe { CertDuplicateCertificateContext(next) };
        Some(SystemCertificate {
            context,
            _store: PhantomData,
        })
    }
}

impl Drop for SystemCertificates<'_> {
    fn drop(&mut self) {
        if !self.cursor.is_null() {
            // SAFETY: an enumeration stopped early still owns its cursor.
            unsafe {
                CertFreeCertificateContext(self.cursor);
            }
        }
    }
}

/// One certificate context, valid while its store is open.
pub struct SystemCertificate<'s> {
    context: *const CERT_CONTEXT,
    _store: PhantomData<&'s SystemStore>,
}

impl Drop for SystemCertificate<'_> {
    fn drop(&mut self) {
        // SAFETY: the context was duplicated for this value alone.
        unsafe {
            CertFreeCertificateContext(self.context);
        }
    }
}

impl SystemCertificate<'_> {
    fn property_len(&self, prop_id: u32) -> Option<u32> {
        let mut len = 0u32;
        // SAFETY: a null buffer asks only for the size.
        let ok = unsafe {
            CertGetCertificateContextProperty(self.context, prop_id, ptr::null_mut(), &mut len)
        };
        (ok != 0).then_some(len)
    }

    fn property_string(&self, prop_id: u32) -> io::Result<String> {
        let mut len = self
            .property_len(prop_id)
            .ok_or_else(io::Error::last_os_error)?;

        let mut buf = vec![0u16; (len as usize).div_ceil(2)];
        // SAFETY: `buf` holds at least `len` bytes.
        let ok = unsafe {
            CertGetCertificateContextProperty(
                self.context,
                prop_id,
                buf.as_mut_ptr() as *mut c_void,
                &mut len,
            )
        };
        if ok == 0 {
            return Err(io::Error::last_os_error());
        }

        let end = buf.iter().position(|&c| c == 0).unwrap_or(buf.len());
        Ok(String::from_utf16_lossy(&buf[..end]))
    }

    /// Sizes a plaintext private-key blob. Keys whose policy allows only
    /// encrypted export fail here even though PFX export would accept them.
    fn export_cng_key(key: usize) -> io::Result<()> {
        let mut len = 0u32;
        // SAFETY: size query only; no output buffer.
        let status = unsafe {
            NCryptExportKey(
                key,
                0,
                BCRYPT_PRIVATE_KEY_BLOB,
                ptr::null(),
                ptr::null_mut(),
                0,
                &mut len,
                0,
            )
        };
        if status != 0 {
            return Err(io::Error::from_raw_os_error(status));
        }
        Ok(())
    }

    fn export_csp_key(provider: usize, key_spec: u32) -> io::Result<()> {
        let mut key = 0usize;
        // SAFETY: `provider` is a live CSP handle.
        if unsafe { CryptGetUserKey(provider, key_spec, &mut key) } == 0 {
            return Err(io::Error::last_os_error());
        }

        let mut len = 0u32;
        // SAFETY: size query only; the key handle is destroyed right after.
        let ok = unsafe { CryptExportKey(key, 0, PRIVATEKEYBLOB, 0, ptr::null_mut(), &mut len) };
        let result = if ok == 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(())
        };

        // SAFETY: `key` came from CryptGetUserKey.
        unsafe {
            CryptDestroyKey(key);
        }
        result
    }
}

impl NativeCertificate for SystemCertificate<'_> {
    fn encoded(&self) -> &[u8] {
        // SAFETY: the context stays alive for the lifetime of `self`.
        unsafe {
            let ctx = &*self.context;
            std::slice::from_raw_parts(ctx.pbCertEncoded, ctx.cbCertEncoded as usize)
        }
    }

    fn friendly_name(&self) -> String {
        self.property_string(CERT_FRIENDLY_NAME_PROP_ID)
            .unwrap_or_default()
    }

    fn has_private_key(&self) -> bool {
        self.property_len(CERT_KEY_PROV_INFO_PROP_ID).is_some()
    }

    fn try_export_key(&self) -> io::Result<()> {
        let mut handle = 0usize;
        let mut key_spec = 0u32;
        let mut must_free = 0i32;

        // SAFETY: out-pointers are valid locals.
        let ok = unsafe {
            CryptAcquireCertificatePrivateKey(
                self.context,
                CRYPT_ACQUIRE_ALLOW_NCRYPT_KEY_FLAG | CRYPT_ACQUIRE_SILENT_FLAG,
                ptr::null(),
                &mut handle,
                &mut key_spec,
                &mut must_free,
            )
        };
        if ok == 0 {
            return Err(io::Error::last_os_error());
        }

        if key_spec == CERT_NCRYPT_KEY_SPEC {
            let result = Self::export_cng_key(handle);
            if must_free != 0 {
                // SAFETY: we own the key handle when `must_free` is set.
                unsafe {
                    NCryptFreeObject(handle);
                }
            }
            result
        } else {
            let result = Self::export_csp_key(handle, key_spec);
            if must_free != 0 {
                // SAFETY: we own the provider handle when `must_free` is set.
                unsafe {
                    CryptReleaseContext(handle, 0);
                }
            }
            result
        }
    }

    fn export_pkcs12(&self) -> io::Result<Zeroizing<Vec<u8>>> {
        // SAFETY: a fresh memory store with no parameters.
        let memory = unsafe {
            CertOpenStore(
                CERT_STORE_PROV_MEMORY,
                0,
                0,
                CERT_STORE_CREATE_NEW_FLAG,
                ptr::null(),
            )
        };
        if memory.is_null() {
            return Err(io::Error::last_os_error());
        }
        let memory = SystemStore { handle: memory };

        // SAFETY: both handles are live; the store takes its own reference.
        let ok = unsafe {
            CertAddCertificateContextToStore(
                memory.handle,
                self.context,
                CERT_STORE_ADD_ALWAYS,
                ptr::null_mut(),
            )
        };
        if ok == 0 {
            return Err(io::Error::last_os_error());
        }

        let flags = EXPORT_PRIVATE_KEYS | REPORT_NOT_ABLE_TO_EXPORT_PRIVATE_KEY;
        let mut blob = CRYPT_INTEGER_BLOB {
            cbData: 0,
            pbData: ptr::null_mut(),
        };

        // SAFETY: first call sizes the blob, second call fills `buffer`.
        let ok = unsafe {
            PFXExportCertStoreEx(memory.handle, &mut blob, ptr::null(), ptr::null(), flags)
        };
        if ok == 0 {
            return Err(io::Error::last_os_error());
        }

        let mut buffer = Zeroizing::new(vec![0u8; blob.cbData as usize]);
        blob.pbData = buffer.as_mut_ptr();

        let ok = unsafe {
            PFXExportCertStoreEx(memory.handle, &mut blob, ptr::null(), ptr::null(), flags)
        };
        if ok == 0 {
            return Err(io::Error::last_os_error());
        }

        buffer.truncate(blob.cbData as usize);
        Ok(buffer)
    }
}
