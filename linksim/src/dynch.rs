//! A request channel carrying type-erased closures to an actor that owns some context.
//!
//! The actor side receives [`DynRequest`]s, runs each task against its `&mut Ctx` and sends the
//! boxed result back. The caller side gets a [`DynRequestResponse`] that downcasts the result
//! to the type the task produced. One channel therefore serves any number of request kinds
//! without an enum of commands.

use std::{any::Any, marker::PhantomData};

use tokio::sync::{mpsc, oneshot};

/// A syntax-sugar alias for a trait object which is `Any + Send + 'static`.
type AnySendStatic = dyn Any + Send + 'static;

/// A boxed task run by the actor with exclusive access to its context.
pub type DynTask<Ctx> = Box<dyn FnOnce(&mut Ctx) -> Box<AnySendStatic> + Send + 'static>;

/// A request created by [`DynRequestSender::submit`].
pub struct DynRequest<Ctx> {
    task: DynTask<Ctx>,
    /// Where the type-erased result of `task` goes.
    tx: oneshot::Sender<Box<AnySendStatic>>,
}

impl<Ctx> DynRequest<Ctx> {
    /// Break the request into its task and the response channel.
    pub fn into_parts(self) -> (DynTask<Ctx>, oneshot::Sender<Box<AnySendStatic>>) {
        (self.task, self.tx)
    }

    /// Runs the task against `ctx` and sends the result back. A caller that stopped waiting
    /// is not an error.
    pub fn run(self, ctx: &mut Ctx) {
        let (task, tx) = self.into_parts();
        let _ = tx.send(task(ctx));
    }
}

/// The pending result of a submitted request.
pub struct DynRequestResponse<T: 'static> {
    rx: oneshot::Receiver<Box<AnySendStatic>>,
    _marker: PhantomData<T>,
}

impl<T> DynRequestResponse<T> {
    /// Waits for the actor to run the task and downcasts its result.
    pub async fn receive(self) -> Result<T, oneshot::error::RecvError> {
        let to_cast = self.rx.await?;
        let value = *to_cast.downcast::<T>().expect("same type");
        Ok(value)
    }
}

/// The sender of [`DynRequest`].
pub struct DynRequestSender<Ctx> {
    tx: mpsc::Sender<DynRequest<Ctx>>,
}

impl<Ctx> Clone for DynRequestSender<Ctx> {
    fn clone(&self) -> Self {
        Self { tx: self.tx.clone() }
    }
}

impl<Ctx> std::fmt::Debug for DynRequestSender<Ctx> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynRequestSender").field("closed", &self.tx.is_closed()).finish()
    }
}

impl<Ctx> DynRequestSender<Ctx> {
    /// Submits `f` to the actor. Fails if the actor is gone.
    pub async fn submit<T, F>(
        &self,
        f: F,
    ) -> std::result::Result<DynRequestResponse<T>, mpsc::error::SendError<()>>
    where
        T: Any + Send + 'static,
        F: FnOnce(&mut Ctx) -> T + Send + 'static,
    {
        let task: DynTask<Ctx> = Box::new(move |ctx: &mut Ctx| Box::new(f(ctx)) as Box<AnySendStatic>);

        let (tx, rx) = oneshot::channel();
        self.tx.send(DynRequest { task, tx }).await.map_err(|_| mpsc::error::SendError(()))?;

        Ok(DynRequestResponse { rx, _marker: PhantomData })
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// A bounded request channel with room for `buffer` pending requests.
pub fn channel<Ctx>(buffer: usize) -> (DynRequestSender<Ctx>, mpsc::Receiver<DynRequest<Ctx>>) {
    let (tx, rx) = mpsc::channel(buffer);
    (DynRequestSender { tx }, rx)
}
